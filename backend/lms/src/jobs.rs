//! Periodic background jobs: daily progress reminders and weekly center
//! reports. Last runs are kept in `job_runs` so a restart does not run a job
//! before it is due.

use std::time::Duration;

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::api::center;
use crate::db;
use crate::errors::Result;
use crate::notify::{self, format_ariary};
use crate::period::{self, DAY};

pub const PROGRESS_REMINDERS: &str = "send_progress_reminders";
pub const CENTER_REPORTS: &str = "generate_center_reports";

/// Enrollments untouched for this long get a reminder.
const STALE_AFTER: i64 = 7 * DAY;

const JOBS: [(&str, i64); 2] = [(PROGRESS_REMINDERS, DAY), (CENTER_REPORTS, 7 * DAY)];

/// Run the job loop forever, checking for due jobs every `interval_secs`.
pub async fn run(pool: SqlitePool, interval_secs: u64) {
    info!("Job loop starting, checking every {interval_secs}s");
    loop {
        let ran = run_due(&pool, db::now(), period::today()).await;
        if !ran.is_empty() {
            info!("Jobs completed: {}", ran.join(", "));
        }
        tokio::time::sleep(Duration::from_secs(interval_secs.max(1))).await;
    }
}

/// Run every job whose period has elapsed since its last run and return the
/// names of those that succeeded. A failing job is logged and retried on the
/// next tick.
pub async fn run_due(pool: &SqlitePool, now: i64, today: NaiveDate) -> Vec<&'static str> {
    let mut ran = Vec::new();
    for (job, every) in JOBS {
        let last = match db::get_last_run(pool, job).await {
            Ok(last) => last,
            Err(e) => {
                error!("Could not read last run of {job}: {e}");
                continue;
            }
        };
        if last.is_some_and(|at| now - at < every) {
            continue;
        }

        let outcome = match job {
            PROGRESS_REMINDERS => send_progress_reminders(pool, now).await,
            _ => generate_center_reports(pool, today).await,
        };
        match outcome {
            Ok(sent) => {
                info!("{job}: {sent} mail(s) queued");
                if let Err(e) = db::save_last_run(pool, job, now).await {
                    error!("Could not record run of {job}: {e}");
                }
                ran.push(job);
            }
            Err(e) => error!("{job} failed: {e}"),
        }
    }
    ran
}

/// One reminder per student with a paid or started EC that has not moved in
/// a week. Returns the number of mails queued.
pub async fn send_progress_reminders(pool: &SqlitePool, now: i64) -> Result<usize> {
    let students: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT s.email, s.full_name, COUNT(*)
        FROM   enrollments e
        JOIN   students s ON s.id = e.student
        WHERE  e.status IN ('Paid', 'In Progress')
          AND  e.modified_at < ?1
          AND  COALESCE(s.email, '') != ''
        GROUP  BY s.id
        ORDER  BY s.id
        "#,
    )
    .bind(now - STALE_AFTER)
    .fetch_all(pool)
    .await?;

    for (email, name, pending) in &students {
        let body = format!(
            "Bonjour {name},\n\n\
             Vous avez {pending} EC en cours sans activité depuis plus de 7 jours.\n\
             Reprenez vos cours sur la plateforme CNTEMAD pour avancer vers votre validation.\n"
        );
        notify::queue_mail(pool, email, "Continuez votre formation CNTEMAD", &body).await;
    }
    Ok(students.len())
}

/// Weekly KPI digest for every active center that has an admin email.
pub async fn generate_center_reports(pool: &SqlitePool, today: NaiveDate) -> Result<usize> {
    let centers: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT id, center_name, admin_email
        FROM   centers
        WHERE  is_active = 1 AND COALESCE(admin_email, '') != ''
        ORDER  BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut sent = 0;
    for (id, name, admin_email) in centers {
        let kpis = match center::center_kpis(pool, &id, today).await {
            Ok(kpis) => kpis,
            Err(e) => {
                warn!("Skipping report for center {id}: {e}");
                continue;
            }
        };
        let body = format!(
            "Rapport hebdomadaire du centre {name}\n\n\
             Étudiants: {} ({} actifs)\n\
             Paiements du mois: {} ({})\n\
             Paiements en attente: {}\n\
             Validations du mois: {}\n\
             Taux de validation: {}%\n",
            kpis.total_students,
            kpis.active_students,
            kpis.monthly_payments,
            format_ariary(kpis.monthly_revenue),
            kpis.pending_payments,
            kpis.monthly_validations,
            kpis.validation_rate,
        );
        notify::queue_mail(
            pool,
            &admin_email,
            &format!("Rapport hebdomadaire - {name}"),
            &body,
        )
        .await;
        sent += 1;
    }
    Ok(sent)
}
