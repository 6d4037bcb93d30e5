//! Enrollment activation and per-student progress.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db;
use crate::errors::Result;
use crate::models::{Enrollment, EnrollmentStatus};

/// Grant access to an EC after a completed payment.
///
/// Upserts on `(student, ec)`. A new row starts as `Paid`; an existing row
/// only has its payment link refreshed, so a student who is already
/// `In Progress` or `Validated` keeps that status.
///
/// Returns `true` when the enrollment was created.
pub async fn activate_enrollment(
    conn: &mut SqliteConnection,
    student: &str,
    ec: &str,
    payment: &str,
) -> Result<bool> {
    let exists: Option<String> =
        sqlx::query_scalar("SELECT id FROM enrollments WHERE student = ?1 AND ec = ?2")
            .bind(student)
            .bind(ec)
            .fetch_optional(&mut *conn)
            .await?;

    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO enrollments
            (id, student, ec, status, payment, enrollment_date, created_at, modified_at)
        VALUES (?1, ?2, ?3, 'Paid', ?4, ?5, ?5, ?5)
        ON CONFLICT (student, ec) DO UPDATE SET
            payment     = excluded.payment,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(db::new_id("ENR"))
    .bind(student)
    .bind(ec)
    .bind(payment)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let created = exists.is_none();
    if created {
        info!("Enrollment created: student {student} on EC {ec}");
    }
    Ok(created)
}

pub async fn find_enrollment(
    pool: &SqlitePool,
    student: &str,
    ec: &str,
) -> Result<Option<Enrollment>> {
    let row = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student = ?1 AND ec = ?2",
    )
    .bind(student)
    .bind(ec)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// `round(x, 1)`.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Share of `part` in `total`, in percent with one decimal; zero when empty.
pub fn percent1(part: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        round1(part as f64 / total as f64 * 100.0)
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EnrollmentSummary {
    pub id: String,
    pub ec: String,
    pub ec_title: Option<String>,
    pub status: EnrollmentStatus,
    pub quiz_score: f64,
    pub quiz_attempts: i64,
    pub validation_date: Option<i64>,
    pub enrollment_date: i64,
    pub modified_at: i64,
}

#[derive(Debug, Serialize)]
pub struct StudentProgress {
    pub total_ec: i64,
    pub validated_ec: i64,
    pub progress_percent: f64,
    pub current_year: String,
    pub enrollments: Vec<EnrollmentSummary>,
}

pub async fn student_enrollments(pool: &SqlitePool, student: &str) -> Result<Vec<EnrollmentSummary>> {
    let rows = sqlx::query_as::<_, EnrollmentSummary>(
        r#"
        SELECT e.id, e.ec, ec.title AS ec_title, e.status, e.quiz_score, e.quiz_attempts,
               e.validation_date, e.enrollment_date, e.modified_at
        FROM   enrollments e
        LEFT JOIN ecs ec ON ec.id = e.ec
        WHERE  e.student = ?1
        ORDER  BY e.modified_at DESC, e.id ASC
        "#,
    )
    .bind(student)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn student_progress(
    pool: &SqlitePool,
    student: &str,
    current_year: Option<&str>,
) -> Result<StudentProgress> {
    let enrollments = student_enrollments(pool, student).await?;
    let total_ec = enrollments.len() as i64;
    let validated_ec = enrollments
        .iter()
        .filter(|e| e.status == EnrollmentStatus::Validated)
        .count() as i64;

    Ok(StudentProgress {
        total_ec,
        validated_ec,
        progress_percent: percent1(validated_ec, total_ec),
        current_year: current_year
            .filter(|y| !y.is_empty())
            .unwrap_or("L1")
            .to_string(),
        enrollments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pool, seed_catalog, seed_student};

    #[test]
    fn percentages_round_to_one_decimal() {
        assert_eq!(percent1(1, 3), 33.3);
        assert_eq!(percent1(2, 3), 66.7);
        assert_eq!(percent1(0, 0), 0.0);
    }

    #[tokio::test]
    async fn activation_creates_once_and_never_downgrades() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(activate_enrollment(&mut conn, "STU-0001", "DROIT101", "PAY-A")
            .await
            .unwrap());
        sqlx::query("UPDATE enrollments SET status = 'Validated'")
            .execute(&mut *conn)
            .await
            .unwrap();
        assert!(!activate_enrollment(&mut conn, "STU-0001", "DROIT101", "PAY-B")
            .await
            .unwrap());
        drop(conn);

        let enrollment = find_enrollment(&pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Validated);
        assert_eq!(enrollment.payment.as_deref(), Some("PAY-B"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn progress_defaults_to_first_year() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let progress = student_progress(&pool, "STU-0001", None).await.unwrap();
        assert_eq!(progress.total_ec, 0);
        assert_eq!(progress.progress_percent, 0.0);
        assert_eq!(progress.current_year, "L1");
    }
}
