//! CNTEMAD LMS server entry point.
//!
//! Serves the `/api/method/*` RPC routes over SQLite and runs the periodic
//! jobs (progress reminders, center reports) in a background task.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cntemad_lms::api::{self, ApiState};
use cntemad_lms::auth::{self, Role};
use cntemad_lms::config::Config;
use cntemad_lms::{db, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    if let Some((email, token)) = &config.bootstrap_admin {
        auth::upsert_user(
            &pool,
            email,
            "Administrateur national",
            &[Role::NationalAdmin],
            Some(token.as_str()),
        )
        .await?;
        info!("National admin {email} ready");
    }

    // ─── Background jobs ──────────────────────────────────
    tokio::spawn(jobs::run(pool.clone(), config.job_interval_secs));

    // ─── REST API ─────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.api_port);
    let state = Arc::new(ApiState::new(pool, config)?);
    let app = api::router(state);

    info!("API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
