//! `evaluator.*` routes: grading queue and certificate issuance.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::info;

use super::{non_empty, page, reply, ApiResult, ApiState};
use crate::auth::{CurrentUser, Role, Session};
use crate::db;
use crate::enrollment::round1;
use crate::errors::{is_unique_violation, AppError, Result};
use crate::models::{Enrollment, Submission, YEARS};
use crate::notify;
use crate::period;
use crate::quiz::{self, AttemptRow};

const EVALUATORS: &[Role] = &[Role::Evaluator];

// ─────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EvaluatorProfile {
    pub name: String,
    pub user: String,
    pub full_name: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EvaluatorStats {
    pub total_corrections: i64,
    pub corrections_this_month: i64,
    pub pending_count: i64,
    pub certificates_validated: i64,
    pub avg_grade: f64,
}

#[derive(Debug, Serialize)]
pub struct EvaluatorDashboard {
    pub evaluator: EvaluatorProfile,
    pub stats: EvaluatorStats,
    pub pending_corrections: Vec<PendingCorrection>,
    pub recent_corrections: Vec<RecentCorrection>,
    pub pending_certificates: Vec<PendingCertificate>,
}

pub async fn evaluator_stats(pool: &SqlitePool, email: &str) -> Result<EvaluatorStats> {
    let (total_corrections, corrections_this_month, avg_grade): (i64, i64, Option<f64>) =
        sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN graded_at >= ?2 THEN 1 ELSE 0 END), 0),
                   AVG(grade)
            FROM   submissions
            WHERE  graded_by = ?1
            "#,
        )
        .bind(email)
        .bind(period::month_start(period::today()))
        .fetch_one(pool)
        .await?;

    let certificates_validated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE issued_by = ?1")
            .bind(email)
            .fetch_one(pool)
            .await?;

    Ok(EvaluatorStats {
        total_corrections,
        corrections_this_month,
        pending_count: pending_count(pool, email).await?,
        certificates_validated,
        avg_grade: round1(avg_grade.unwrap_or(0.0)),
    })
}

/// `GET evaluator.get_evaluator_dashboard`
pub async fn get_evaluator_dashboard(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<EvaluatorDashboard> {
    let user = session.require(EVALUATORS)?;
    let pool = &state.pool;
    Ok(reply(EvaluatorDashboard {
        evaluator: profile(user),
        stats: evaluator_stats(pool, &user.email).await?,
        pending_corrections: pending_corrections(pool, &user.email, 10, 0).await?,
        recent_corrections: recent_corrections(pool, &user.email, 5).await?,
        pending_certificates: pending_certificates(pool, 5).await?,
    }))
}

fn profile(user: &CurrentUser) -> EvaluatorProfile {
    EvaluatorProfile {
        name: user.email.clone(),
        user: user.email.clone(),
        full_name: user.full_name.clone(),
    }
}

// ─────────────────────────────────────────────────────────
// Corrections
// ─────────────────────────────────────────────────────────

/// A piece of work waiting for an evaluator: an assignment submission, or a
/// quiz enrollment whose attempts ran out.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PendingCorrection {
    pub name: String,
    pub student: String,
    pub ec: String,
    pub student_name: Option<String>,
    pub ec_title: Option<String>,
    pub submission_date: i64,
    pub submission_type: String,
    pub file_url: Option<String>,
    pub quiz_score: Option<f64>,
    pub quiz_attempts: Option<i64>,
}

pub async fn pending_corrections(
    pool: &SqlitePool,
    email: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<PendingCorrection>> {
    let rows = sqlx::query_as::<_, PendingCorrection>(
        r#"
        SELECT s.id AS name, s.student, s.ec, st.full_name AS student_name,
               ec.title AS ec_title, s.submission_date, s.submission_type, s.file_url,
               NULL AS quiz_score, NULL AS quiz_attempts
        FROM   submissions s
        LEFT JOIN students st ON st.id = s.student
        LEFT JOIN ecs ec ON ec.id = s.ec
        WHERE  s.status = 'Pending'
          AND  (s.assigned_evaluator IS NULL OR s.assigned_evaluator = ''
                OR s.assigned_evaluator = ?1)
        UNION ALL
        SELECT e.id, e.student, e.ec, st.full_name, ec.title, e.modified_at, 'quiz', NULL,
               e.quiz_score, e.quiz_attempts
        FROM   enrollments e
        LEFT JOIN students st ON st.id = e.student
        LEFT JOIN ecs ec ON ec.id = e.ec
        WHERE  e.needs_review = 1 AND e.status != 'Validated'
        ORDER  BY submission_date ASC, name ASC
        LIMIT  ?2 OFFSET ?3
        "#,
    )
    .bind(email)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn pending_count(pool: &SqlitePool, email: &str) -> Result<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT (SELECT COUNT(*) FROM submissions
                WHERE  status = 'Pending'
                  AND  (assigned_evaluator IS NULL OR assigned_evaluator = ''
                        OR assigned_evaluator = ?1))
             + (SELECT COUNT(*) FROM enrollments
                WHERE  needs_review = 1 AND status != 'Validated')
        "#,
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET evaluator.get_pending_corrections`
pub async fn get_pending_corrections(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<PendingCorrection>> {
    let user = session.require(EVALUATORS)?;
    let (limit, offset) = page(q.limit, 20, q.offset);
    Ok(reply(
        pending_corrections(&state.pool, &user.email, limit, offset).await?,
    ))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentCorrection {
    pub name: String,
    pub student: String,
    pub ec: String,
    pub grade: Option<f64>,
    pub graded_at: Option<i64>,
    pub submission_type: String,
    pub student_name: Option<String>,
    pub ec_title: Option<String>,
}

pub async fn recent_corrections(pool: &SqlitePool, email: &str, limit: i64) -> Result<Vec<RecentCorrection>> {
    let rows = sqlx::query_as::<_, RecentCorrection>(
        r#"
        SELECT s.id AS name, s.student, s.ec, s.grade, s.graded_at, s.submission_type,
               st.full_name AS student_name, ec.title AS ec_title
        FROM   submissions s
        LEFT JOIN students st ON st.id = s.student
        LEFT JOIN ecs ec ON ec.id = s.ec
        WHERE  s.graded_by = ?1 AND s.status = 'Graded'
        ORDER  BY s.graded_at DESC, s.id DESC
        LIMIT  ?2
        "#,
    )
    .bind(email)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `GET evaluator.get_recent_corrections`
pub async fn get_recent_corrections(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<RecentCorrection>> {
    let user = session.require(EVALUATORS)?;
    let (limit, _) = page(q.limit, 10, None);
    Ok(reply(recent_corrections(&state.pool, &user.email, limit).await?))
}

// ─────────────────────────────────────────────────────────
// Submission detail and grading
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StudentRef {
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EcRef {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Work {
    Assignment {
        date: i64,
        #[serde(rename = "type")]
        kind: String,
        file_url: Option<String>,
        content: Option<String>,
    },
    Quiz {
        date: i64,
        #[serde(rename = "type")]
        kind: &'static str,
        quiz_score: f64,
        quiz_attempts: i64,
        quiz_history: Vec<AttemptRow>,
    },
}

#[derive(Debug, Serialize)]
pub struct Grading {
    pub status: String,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub graded_by: Option<String>,
    pub graded_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub student: StudentRef,
    pub ec: EcRef,
    pub submission: Work,
    pub grading: Grading,
}

async fn find_submission(pool: &SqlitePool, id: &str) -> Result<Option<Submission>> {
    let row = sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn find_enrollment_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Enrollment>> {
    let row = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn refs(pool: &SqlitePool, student: &str, ec: &str) -> Result<(StudentRef, EcRef)> {
    let student = db::fetch_student(pool, student).await?;
    let ec = db::fetch_ec(pool, ec).await?;
    Ok((
        StudentRef {
            name: student.id,
            full_name: student.full_name,
            email: student.email,
        },
        EcRef {
            name: ec.id,
            title: ec.title,
            description: ec.description,
        },
    ))
}

/// Look `id` up as a submission first, then as an enrollment under review.
pub async fn submission_detail(pool: &SqlitePool, id: &str) -> Result<SubmissionDetail> {
    if let Some(sub) = find_submission(pool, id).await? {
        let (student, ec) = refs(pool, &sub.student, &sub.ec).await?;
        return Ok(SubmissionDetail {
            kind: "submission",
            name: sub.id,
            student,
            ec,
            submission: Work::Assignment {
                date: sub.submission_date,
                kind: sub.submission_type,
                file_url: sub.file_url,
                content: sub.content,
            },
            grading: Grading {
                status: sub.status,
                grade: sub.grade,
                feedback: sub.feedback,
                graded_by: sub.graded_by,
                graded_at: sub.graded_at,
            },
        });
    }

    if let Some(enrollment) = find_enrollment_by_id(pool, id).await? {
        let (student, ec) = refs(pool, &enrollment.student, &enrollment.ec).await?;
        let mut history = quiz::attempt_log(pool, &enrollment.student, &enrollment.ec).await?;
        history.truncate(5);
        return Ok(SubmissionDetail {
            kind: "enrollment",
            name: enrollment.id,
            student,
            ec,
            submission: Work::Quiz {
                date: enrollment.modified_at,
                kind: "quiz",
                quiz_score: enrollment.quiz_score,
                quiz_attempts: enrollment.quiz_attempts,
                quiz_history: history,
            },
            grading: Grading {
                status: enrollment.status.as_str().to_string(),
                grade: enrollment.final_grade.or(Some(enrollment.quiz_score)),
                feedback: enrollment.evaluator_feedback,
                graded_by: enrollment.graded_by,
                graded_at: enrollment.graded_at,
            },
        });
    }

    Err(AppError::not_found("Soumission non trouvée"))
}

#[derive(Debug, Deserialize)]
pub struct SubmissionQuery {
    pub submission_id: String,
}

/// `GET evaluator.get_submission_detail`
pub async fn get_submission_detail(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<SubmissionQuery>,
) -> ApiResult<SubmissionDetail> {
    session.require(EVALUATORS)?;
    Ok(reply(submission_detail(&state.pool, &q.submission_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct GradeBody {
    pub submission_id: String,
    pub grade: f64,
    pub feedback: Option<String>,
    #[serde(default)]
    pub validate_ec: bool,
}

#[derive(Debug, Serialize)]
pub struct Done {
    pub success: bool,
    pub message: String,
}

/// Record a grade on a submission or on a quiz enrollment under review.
pub async fn grade(pool: &SqlitePool, user: &CurrentUser, body: &GradeBody) -> Result<Done> {
    if !body.grade.is_finite() || !(0.0..=100.0).contains(&body.grade) {
        return Err(AppError::validation("La note doit être comprise entre 0 et 100"));
    }
    let feedback = non_empty(&body.feedback);
    let now = db::now();

    if let Some(sub) = find_submission(pool, &body.submission_id).await? {
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE submissions
            SET    status = 'Graded', grade = ?2, feedback = ?3, graded_by = ?4, graded_at = ?5
            WHERE  id = ?1
            "#,
        )
        .bind(&sub.id)
        .bind(body.grade)
        .bind(feedback)
        .bind(&user.email)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if body.validate_ec {
            let validated = sqlx::query(
                r#"
                UPDATE enrollments
                SET    status = 'Validated', final_grade = ?3,
                       validation_date = COALESCE(validation_date, ?4),
                       needs_review = 0, modified_at = ?4
                WHERE  student = ?1 AND ec = ?2
                "#,
            )
            .bind(&sub.student)
            .bind(&sub.ec)
            .bind(body.grade)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            // Dropping the transaction also discards the grade.
            if validated.rows_affected() == 0 {
                return Err(AppError::validation(
                    "Aucune inscription à valider pour cet EC",
                ));
            }
        }
        tx.commit().await?;

        info!("Submission {} graded {} by {}", sub.id, body.grade, user.email);
        return Ok(Done {
            success: true,
            message: "Note enregistrée".to_string(),
        });
    }

    if let Some(enrollment) = find_enrollment_by_id(pool, &body.submission_id).await? {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET    evaluator_feedback = ?2, graded_by = ?3, graded_at = ?4, needs_review = 0,
                   status = CASE WHEN ?5 THEN 'Validated' ELSE status END,
                   final_grade = CASE WHEN ?5 THEN ?6 ELSE final_grade END,
                   validation_date = CASE WHEN ?5 THEN COALESCE(validation_date, ?4)
                                          ELSE validation_date END,
                   modified_at = ?4
            WHERE  id = ?1
            "#,
        )
        .bind(&enrollment.id)
        .bind(feedback)
        .bind(&user.email)
        .bind(now)
        .bind(body.validate_ec)
        .bind(body.grade)
        .execute(pool)
        .await?;

        info!("Enrollment {} reviewed by {}", enrollment.id, user.email);
        return Ok(Done {
            success: true,
            message: "Évaluation enregistrée".to_string(),
        });
    }

    Err(AppError::not_found("Soumission non trouvée"))
}

/// `POST evaluator.submit_grade`
pub async fn submit_grade(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<GradeBody>,
) -> ApiResult<Done> {
    let user = session.require(EVALUATORS)?;
    Ok(reply(grade(&state.pool, user, &body).await?))
}

// ─────────────────────────────────────────────────────────
// Certificates
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PendingCertificate {
    pub student_id: String,
    pub student_name: String,
    pub email: Option<String>,
    pub center: Option<String>,
    #[sqlx(skip)]
    pub year: String,
    pub validated_ecs: i64,
    #[sqlx(skip)]
    pub total_ecs: i64,
}

async fn published_in_year(pool: &SqlitePool, year: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM ecs WHERE year = ?1 AND is_published = 1")
        .bind(year)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn validated_in_year(pool: &SqlitePool, student: &str, year: &str) -> Result<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM   enrollments e JOIN ecs ec ON ec.id = e.ec
        WHERE  e.student = ?1 AND e.status = 'Validated'
          AND  ec.year = ?2 AND ec.is_published = 1
        "#,
    )
    .bind(student)
    .bind(year)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Students who validated every published EC of a year and hold no
/// certificate for it yet.
pub async fn pending_certificates(pool: &SqlitePool, limit: i64) -> Result<Vec<PendingCertificate>> {
    let mut out = Vec::new();
    for (year, _) in YEARS {
        let total = published_in_year(pool, year).await?;
        if total == 0 {
            continue;
        }
        let rows = sqlx::query_as::<_, PendingCertificate>(
            r#"
            SELECT s.id AS student_id, s.full_name AS student_name, s.email,
                   c.center_name AS center, COUNT(e.id) AS validated_ecs
            FROM   students s
            JOIN   enrollments e ON e.student = s.id
            JOIN   ecs ec ON ec.id = e.ec
            LEFT JOIN centers c ON c.id = s.center
            WHERE  ec.year = ?1 AND ec.is_published = 1 AND e.status = 'Validated'
              AND  NOT EXISTS (SELECT 1 FROM certificates
                               WHERE student = s.id AND year = ?1)
            GROUP  BY s.id
            HAVING COUNT(e.id) >= ?2
            ORDER  BY s.full_name ASC, s.id ASC
            LIMIT  ?3
            "#,
        )
        .bind(year)
        .bind(total)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        out.extend(rows.into_iter().map(|mut row| {
            row.year = year.to_string();
            row.total_ecs = total;
            row
        }));
    }
    out.truncate(limit as usize);
    Ok(out)
}

/// `GET evaluator.get_pending_certificates`
pub async fn get_pending_certificates(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<PendingCertificate>> {
    session.require(EVALUATORS)?;
    let (limit, _) = page(q.limit, 20, None);
    Ok(reply(pending_certificates(&state.pool, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct CertificateBody {
    pub student_id: String,
    pub year: String,
    pub certificate_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuedCertificate {
    pub success: bool,
    pub certificate_id: String,
    pub certificate_number: String,
    pub message: String,
}

pub fn certificate_number(year: &str, student_id: &str, on: chrono::NaiveDate) -> String {
    format!(
        "CNTEMAD-{year}-{}-{}",
        on.format("%Y%m%d"),
        db::tail(student_id, 4)
    )
}

const MAX_NUMBER_SUFFIX: u32 = 20;

async fn held_certificate(pool: &SqlitePool, student: &str, year: &str) -> Result<Option<String>> {
    let number = sqlx::query_scalar(
        "SELECT certificate_number FROM certificates WHERE student = ?1 AND year = ?2",
    )
    .bind(student)
    .bind(year)
    .fetch_optional(pool)
    .await?;
    Ok(number)
}

fn already_issued(year: &str) -> AppError {
    AppError::Conflict(format!("Un certificat {year} existe déjà pour cet étudiant"))
}

pub async fn issue_certificate(
    pool: &SqlitePool,
    user: &CurrentUser,
    body: &CertificateBody,
) -> Result<IssuedCertificate> {
    let student = db::fetch_student(pool, &body.student_id).await?;
    let year = body.year.trim();
    if !YEARS.iter().any(|(code, _)| *code == year) {
        return Err(AppError::validation(format!("Année invalide: {year}")));
    }

    let total = published_in_year(pool, year).await?;
    let validated = validated_in_year(pool, &student.id, year).await?;
    if total == 0 || validated < total {
        return Err(AppError::validation(format!(
            "L'étudiant n'a pas validé tous les EC ({validated}/{total})"
        )));
    }

    if held_certificate(pool, &student.id, year).await?.is_some() {
        return Err(already_issued(year));
    }

    // A chosen number is kept as is; a generated one gets a suffix when
    // another student already holds it.
    let chosen = non_empty(&body.certificate_number).map(str::to_string);
    let base = chosen
        .clone()
        .unwrap_or_else(|| certificate_number(year, &student.id, period::today()));
    let id = db::new_id("CERT");
    let mut number = base.clone();
    let mut suffix = 1;
    loop {
        let inserted = sqlx::query(
            r#"
            INSERT INTO certificates (id, student, year, certificate_number, issued_by, issued_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(&student.id)
        .bind(year)
        .bind(&number)
        .bind(&user.email)
        .bind(db::now())
        .execute(pool)
        .await;
        match inserted {
            Ok(_) => break,
            Err(e) if is_unique_violation(&e) => {
                if held_certificate(pool, &student.id, year).await?.is_some() {
                    return Err(already_issued(year));
                }
                if chosen.is_some() || suffix >= MAX_NUMBER_SUFFIX {
                    return Err(AppError::Conflict(format!(
                        "Le numéro de certificat {number} est déjà utilisé"
                    )));
                }
                suffix += 1;
                number = format!("{base}-{suffix}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Certificate {number} issued to {} by {}", student.id, user.email);
    notify::certificate_issued(pool, &student.id, year, &number).await;

    Ok(IssuedCertificate {
        success: true,
        certificate_id: id,
        certificate_number: number,
        message: format!("Certificat {year} créé pour {}", student.full_name),
    })
}

/// `POST evaluator.validate_certificate`
pub async fn validate_certificate(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<CertificateBody>,
) -> ApiResult<IssuedCertificate> {
    let user = session.require(EVALUATORS)?;
    Ok(reply(issue_certificate(&state.pool, user, &body).await?))
}

// ─────────────────────────────────────────────────────────
// Rubric
// ─────────────────────────────────────────────────────────

pub fn default_rubric() -> Value {
    json!({
        "scale": "0-20",
        "passing_grade": 10,
        "criteria": [
            {"name": "Compréhension", "weight": 30, "description": "Compréhension du sujet"},
            {"name": "Analyse", "weight": 25, "description": "Qualité de l'analyse"},
            {"name": "Argumentation", "weight": 25, "description": "Clarté de l'argumentation"},
            {"name": "Présentation", "weight": 20, "description": "Qualité de la présentation"}
        ],
        "grade_labels": {
            "0-5": "Insuffisant",
            "6-9": "Passable",
            "10-12": "Assez bien",
            "13-15": "Bien",
            "16-18": "Très bien",
            "19-20": "Excellent"
        }
    })
}

/// Top-level keys of `custom` replace those of the default rubric. Anything
/// but a JSON object is ignored.
pub fn merge_rubric(custom: Option<&str>) -> Value {
    let mut rubric = default_rubric();
    let custom = custom.and_then(|raw| serde_json::from_str::<Value>(raw).ok());
    if let (Some(Value::Object(custom)), Value::Object(base)) = (custom, &mut rubric) {
        base.extend(custom);
    }
    rubric
}

#[derive(Debug, Deserialize)]
pub struct RubricQuery {
    pub ec_id: Option<String>,
}

/// `GET evaluator.get_grading_rubric`
pub async fn get_grading_rubric(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<RubricQuery>,
) -> ApiResult<Value> {
    session.require(EVALUATORS)?;
    let custom = match non_empty(&q.ec_id) {
        Some(id) => sqlx::query_scalar::<_, Option<String>>(
            "SELECT grading_rubric FROM ecs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .flatten(),
        None => None,
    };
    Ok(reply(merge_rubric(custom.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnrollmentStatus;
    use crate::test_support::{pool, seed_catalog, seed_enrollment, seed_student, user_with_roles};
    use chrono::NaiveDate;

    fn evaluator() -> CurrentUser {
        user_with_roles("eval@cntemad.mg", &[Role::Evaluator])
    }

    async fn submission(pool: &SqlitePool, student: &str, ec: &str) -> String {
        let id = db::new_id("SUB");
        sqlx::query(
            "INSERT INTO submissions (id, student, ec, file_url, submission_date) VALUES (?1, ?2, ?3, 'https://f', ?4)",
        )
        .bind(&id)
        .bind(student)
        .bind(ec)
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[test]
    fn certificate_numbers_use_date_and_student_tail() {
        let on = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            certificate_number("L1", "STU-000123", on),
            "CNTEMAD-L1-20240701-0123"
        );
    }

    #[test]
    fn rubric_merge_is_shallow() {
        let merged = merge_rubric(Some(r#"{"scale": "0-100", "passing_grade": 50}"#));
        assert_eq!(merged["scale"], "0-100");
        assert_eq!(merged["passing_grade"], 50);
        assert_eq!(merged["criteria"].as_array().unwrap().len(), 4);

        assert_eq!(merge_rubric(Some("not json")), default_rubric());
        assert_eq!(merge_rubric(Some("[1, 2]")), default_rubric());
        assert_eq!(merge_rubric(None)["scale"], "0-20");
    }

    #[tokio::test]
    async fn grading_a_submission_can_validate_the_ec() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "In Progress").await;
        let sub = submission(&pool, "STU-0001", "DROIT101").await;

        let queue = pending_corrections(&pool, "eval@cntemad.mg", 20, 0).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].submission_type, "Devoir");

        let out_of_range = GradeBody {
            submission_id: sub.clone(),
            grade: 120.0,
            feedback: None,
            validate_ec: true,
        };
        assert!(grade(&pool, &evaluator(), &out_of_range).await.is_err());

        let body = GradeBody {
            grade: 75.0,
            feedback: Some("Bon travail".into()),
            ..out_of_range
        };
        let done = grade(&pool, &evaluator(), &body).await.unwrap();
        assert_eq!(done.message, "Note enregistrée");

        let enrollment = crate::enrollment::find_enrollment(&pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Validated);
        assert_eq!(enrollment.final_grade, Some(75.0));
        assert!(enrollment.validation_date.is_some());

        assert!(pending_corrections(&pool, "eval@cntemad.mg", 20, 0)
            .await
            .unwrap()
            .is_empty());
        let recent = recent_corrections(&pool, "eval@cntemad.mg", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        let stats = evaluator_stats(&pool, "eval@cntemad.mg").await.unwrap();
        assert_eq!(stats.total_corrections, 1);
        assert_eq!(stats.corrections_this_month, 1);
        assert_eq!(stats.avg_grade, 75.0);
    }

    #[tokio::test]
    async fn submissions_for_other_evaluators_are_hidden() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let sub = submission(&pool, "STU-0001", "DROIT101").await;
        sqlx::query("UPDATE submissions SET assigned_evaluator = 'autre@cntemad.mg' WHERE id = ?1")
            .bind(&sub)
            .execute(&pool)
            .await
            .unwrap();
        assert!(pending_corrections(&pool, "eval@cntemad.mg", 20, 0)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            pending_corrections(&pool, "autre@cntemad.mg", 20, 0)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn quiz_reviews_clear_the_flag() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let id = seed_enrollment(&pool, "STU-0001", "DROIT101", "In Progress").await;
        sqlx::query("UPDATE enrollments SET needs_review = 1, quiz_attempts = 3 WHERE id = ?1")
            .bind(&id)
            .execute(&pool)
            .await
            .unwrap();

        let queue = pending_corrections(&pool, "eval@cntemad.mg", 20, 0).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].submission_type, "quiz");
        assert_eq!(queue[0].quiz_attempts, Some(3));

        let detail = submission_detail(&pool, &id).await.unwrap();
        assert_eq!(detail.kind, "enrollment");

        let body = GradeBody {
            submission_id: id.clone(),
            grade: 40.0,
            feedback: Some("Revoir le chapitre 2".into()),
            validate_ec: false,
        };
        assert_eq!(
            grade(&pool, &evaluator(), &body).await.unwrap().message,
            "Évaluation enregistrée"
        );
        let enrollment = crate::enrollment::find_enrollment(&pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .unwrap();
        assert!(!enrollment.needs_review);
        assert_eq!(enrollment.status, EnrollmentStatus::InProgress);
        assert_eq!(enrollment.graded_by.as_deref(), Some("eval@cntemad.mg"));

        assert!(matches!(
            submission_detail(&pool, "NOPE").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn certificates_need_every_published_ec_of_the_year() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Validated").await;
        let body = CertificateBody {
            student_id: "STU-0001".into(),
            year: "L1".into(),
            certificate_number: None,
        };

        let err = issue_certificate(&pool, &evaluator(), &body).await.unwrap_err();
        assert_eq!(err.to_string(), "L'étudiant n'a pas validé tous les EC (1/2)");
        assert!(pending_certificates(&pool, 20).await.unwrap().is_empty());

        seed_enrollment(&pool, "STU-0001", "DROIT102", "Validated").await;
        let pending = pending_certificates(&pool, 20).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].year, "L1");
        assert_eq!(pending[0].total_ecs, 2);

        let issued = issue_certificate(&pool, &evaluator(), &body).await.unwrap();
        assert!(issued.certificate_number.starts_with("CNTEMAD-L1-"));
        assert!(issued.certificate_number.ends_with("-0001"));
        assert!(pending_certificates(&pool, 20).await.unwrap().is_empty());

        let again = issue_certificate(&pool, &evaluator(), &body).await.unwrap_err();
        assert!(matches!(again, AppError::Conflict(_)));

        let mails: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mail_outbox WHERE recipient = 'etudiant@cntemad.mg'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(mails, 1);

        let bad_year = CertificateBody {
            year: "D1".into(),
            ..body
        };
        assert!(matches!(
            issue_certificate(&pool, &evaluator(), &bad_year).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn students_sharing_an_id_tail_both_get_certificates() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        for (id, email) in [("STU-AAAA0001", "a@cntemad.mg"), ("STU-BBBB0001", "b@cntemad.mg")] {
            seed_student(&pool, id, email, "CTR-TANA").await;
            seed_enrollment(&pool, id, "DROIT101", "Validated").await;
            seed_enrollment(&pool, id, "DROIT102", "Validated").await;
        }
        let body = |student: &str, number: Option<&str>| CertificateBody {
            student_id: student.into(),
            year: "L1".into(),
            certificate_number: number.map(str::to_string),
        };

        let first = issue_certificate(&pool, &evaluator(), &body("STU-AAAA0001", None))
            .await
            .unwrap();
        let second = issue_certificate(&pool, &evaluator(), &body("STU-BBBB0001", None))
            .await
            .unwrap();
        assert!(first.certificate_number.ends_with("-0001"));
        assert_eq!(second.certificate_number, format!("{}-2", first.certificate_number));

        let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE student = 'STU-BBBB0001'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(held, 1);

        let again = issue_certificate(&pool, &evaluator(), &body("STU-BBBB0001", None))
            .await
            .unwrap_err();
        assert_eq!(again.to_string(), "Un certificat L1 existe déjà pour cet étudiant");

        seed_student(&pool, "STU-CCCC0002", "c@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-CCCC0002", "DROIT101", "Validated").await;
        seed_enrollment(&pool, "STU-CCCC0002", "DROIT102", "Validated").await;
        let taken = body("STU-CCCC0002", Some(first.certificate_number.as_str()));
        let err = issue_certificate(&pool, &evaluator(), &taken).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.to_string().starts_with("Le numéro de certificat"));
    }

    #[tokio::test]
    async fn validating_without_an_enrollment_keeps_the_submission_pending() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let sub = submission(&pool, "STU-0001", "DROIT101").await;

        let body = GradeBody {
            submission_id: sub.clone(),
            grade: 60.0,
            feedback: None,
            validate_ec: true,
        };
        let err = grade(&pool, &evaluator(), &body).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (status, graded): (String, Option<f64>) =
            sqlx::query_as("SELECT status, grade FROM submissions WHERE id = ?1")
                .bind(&sub)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "Pending");
        assert_eq!(graded, None);

        let keep = GradeBody {
            validate_ec: false,
            ..body
        };
        assert!(grade(&pool, &evaluator(), &keep).await.is_ok());
    }
}
