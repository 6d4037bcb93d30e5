//! Database layer: pool, migrations, identifiers, and document lifecycle hooks.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{Center, Course, Ec, Payment, Student};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database lives as long as its connection, so keep exactly one.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Clock and identifiers
// ─────────────────────────────────────────────────────────

/// Current time as Unix epoch seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// New document name such as `PAY-3F9A0C21B7D4`.
pub fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", raw[..12].to_uppercase())
}

/// Last `n` characters of `s` (all of it when shorter).
pub fn tail(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars[chars.len().saturating_sub(n)..].iter().collect()
}

// ─────────────────────────────────────────────────────────
// Record lookups
// ─────────────────────────────────────────────────────────

pub async fn fetch_ec(pool: &SqlitePool, id: &str) -> Result<Ec> {
    sqlx::query_as::<_, Ec>("SELECT * FROM ecs WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("EC {id} non trouvé")))
}

pub async fn fetch_course(pool: &SqlitePool, id: &str) -> Result<Course> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Cours {id} non trouvé")))
}

pub async fn fetch_student(pool: &SqlitePool, id: &str) -> Result<Student> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Étudiant {id} non trouvé")))
}

pub async fn fetch_center(pool: &SqlitePool, id: &str) -> Result<Center> {
    sqlx::query_as::<_, Center>("SELECT * FROM centers WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Centre {id} non trouvé")))
}

pub async fn fetch_payment(pool: &SqlitePool, id: &str) -> Result<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Paiement non trouvé"))
}

// ─────────────────────────────────────────────────────────
// Lifecycle hooks
// ─────────────────────────────────────────────────────────

/// Refresh the denormalised `ec_count` of a course after an EC was
/// inserted, moved, or deleted.
pub async fn recompute_ec_count(conn: &mut SqliteConnection, course_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE courses
        SET    ec_count = (SELECT COUNT(*) FROM ecs WHERE course = ?1),
               modified_at = ?2
        WHERE  id = ?1
        "#,
    )
    .bind(course_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Job bookkeeping
// ─────────────────────────────────────────────────────────

/// Last time `job` completed, or `None` if it never ran.
pub async fn get_last_run(pool: &SqlitePool, job: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT last_run FROM job_runs WHERE job = ?1")
        .bind(job)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

pub async fn save_last_run(pool: &SqlitePool, job: &str, at: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_runs (job, last_run) VALUES (?1, ?2)
        ON CONFLICT (job) DO UPDATE SET last_run = excluded.last_run
        "#,
    )
    .bind(job)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_has_prefix_and_fixed_width() {
        let id = new_id("PAY");
        assert!(id.starts_with("PAY-"));
        assert_eq!(id.len(), "PAY-".len() + 12);
        assert_ne!(id, new_id("PAY"));
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("STU-000123", 4), "0123");
        assert_eq!(tail("AB", 4), "AB");
        assert_eq!(tail("", 4), "");
    }

    #[tokio::test]
    async fn job_runs_are_upserted() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        assert_eq!(get_last_run(&pool, "daily").await.unwrap(), None);

        save_last_run(&pool, "daily", 100).await.unwrap();
        save_last_run(&pool, "daily", 200).await.unwrap();
        assert_eq!(get_last_run(&pool, "daily").await.unwrap(), Some(200));
    }

    #[tokio::test]
    async fn ec_count_follows_inserts_and_deletes() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("INSERT INTO courses (id, title) VALUES ('C1', 'Droit')")
            .execute(&mut *conn)
            .await
            .unwrap();
        for id in ["EC1", "EC2"] {
            sqlx::query("INSERT INTO ecs (id, title, course) VALUES (?1, 'x', 'C1')")
                .bind(id)
                .execute(&mut *conn)
                .await
                .unwrap();
        }
        recompute_ec_count(&mut conn, "C1").await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT ec_count FROM courses WHERE id = 'C1'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 2);

        sqlx::query("DELETE FROM ecs WHERE id = 'EC1'")
            .execute(&mut *conn)
            .await
            .unwrap();
        recompute_ec_count(&mut conn, "C1").await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT ec_count FROM courses WHERE id = 'C1'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
