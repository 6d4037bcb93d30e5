//! `center.*` routes: the regional center dashboard.
//!
//! Every route is scoped through [`auth::resolve_center`]: a center admin
//! only ever sees their own center, a national admin may name any.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{non_empty, page, reply, ApiResult, ApiState};
use crate::auth::{self, Session, PAYMENT_ADMINS};
use crate::db;
use crate::errors::{AppError, Result};
use crate::export;
use crate::models::{Center, PaymentStatus};
use crate::period::{self, DAY};

#[derive(Debug, Serialize)]
pub struct CenterRef {
    pub name: String,
    pub title: String,
    pub region: Option<String>,
    pub code: Option<String>,
}

impl From<Center> for CenterRef {
    fn from(c: Center) -> Self {
        Self {
            name: c.id,
            title: c.center_name,
            region: c.region,
            code: c.code,
        }
    }
}

/// `GET center.get_my_center`
pub async fn get_my_center(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<Option<CenterRef>> {
    let user = session.user()?;
    let center = auth::administered_center(&state.pool, &user.email).await?;
    Ok(reply(center.map(CenterRef::from)))
}

async fn scoped_center(pool: &SqlitePool, session: &Session, requested: &Option<String>) -> Result<Center> {
    let user = session.require(PAYMENT_ADMINS)?;
    let id = auth::resolve_center(pool, user, non_empty(requested)).await?;
    db::fetch_center(pool, &id).await
}

// ─────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CenterKpis {
    pub total_students: i64,
    pub active_students: i64,
    pub monthly_payments: i64,
    pub monthly_revenue: i64,
    pub pending_payments: i64,
    pub monthly_validations: i64,
    pub validation_rate: i64,
}

pub async fn center_kpis(pool: &SqlitePool, center: &str, today: NaiveDate) -> Result<CenterKpis> {
    let month = period::month_start(today);

    let (total_students, active_students): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'Active' THEN 1 ELSE 0 END), 0)
        FROM   students
        WHERE  center = ?1
        "#,
    )
    .bind(center)
    .fetch_one(pool)
    .await?;

    let (monthly_payments, monthly_revenue, pending_payments): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'Completed'
                                  AND COALESCE(completed_at, created_at) >= ?2 THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'Completed'
                                  AND COALESCE(completed_at, created_at) >= ?2 THEN amount ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status IN ('Pending', 'Processing') THEN 1 ELSE 0 END), 0)
        FROM   payments
        WHERE  center = ?1
        "#,
    )
    .bind(center)
    .bind(month)
    .fetch_one(pool)
    .await?;

    let (enrollments, validated, monthly_validations): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN e.status = 'Validated' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN e.status = 'Validated' AND e.validation_date >= ?2
                                 THEN 1 ELSE 0 END), 0)
        FROM   enrollments e JOIN students s ON s.id = e.student
        WHERE  s.center = ?1
        "#,
    )
    .bind(center)
    .bind(month)
    .fetch_one(pool)
    .await?;

    Ok(CenterKpis {
        total_students,
        active_students,
        monthly_payments,
        monthly_revenue,
        pending_payments,
        monthly_validations,
        validation_rate: percent0(validated, enrollments),
    })
}

/// Whole-number percentage; zero when `total` is.
pub fn percent0(part: i64, total: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (part as f64 / total as f64 * 100.0).round() as i64
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DayTrend {
    pub date: String,
    pub enrollments: i64,
    pub validations: i64,
    pub payments: i64,
    pub revenue: i64,
}

/// One entry per day of the last `days` days, oldest first.
pub async fn daily_trends(pool: &SqlitePool, center: &str, today: NaiveDate, days: i64) -> Result<Vec<DayTrend>> {
    let windows = period::day_windows(today, days);
    let Some(since) = windows.first().map(|w| w.start) else {
        return Ok(Vec::new());
    };

    let enrollments: Vec<(i64, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT e.created_at, e.validation_date
        FROM   enrollments e JOIN students s ON s.id = e.student
        WHERE  s.center = ?1 AND (e.created_at >= ?2 OR e.validation_date >= ?2)
        "#,
    )
    .bind(center)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let payments: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT COALESCE(completed_at, created_at), amount
        FROM   payments
        WHERE  center = ?1 AND status = 'Completed'
          AND  COALESCE(completed_at, created_at) >= ?2
        "#,
    )
    .bind(center)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(windows
        .iter()
        .map(|w| {
            let paid: Vec<i64> = payments
                .iter()
                .filter(|(at, _)| w.contains(*at))
                .map(|(_, amount)| *amount)
                .collect();
            DayTrend {
                date: w.label.clone(),
                enrollments: enrollments.iter().filter(|(c, _)| w.contains(*c)).count() as i64,
                validations: enrollments
                    .iter()
                    .filter(|(_, v)| v.is_some_and(|v| w.contains(v)))
                    .count() as i64,
                payments: paid.len() as i64,
                revenue: paid.iter().sum(),
            }
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

pub async fn center_alerts(pool: &SqlitePool, center: &str, now: i64) -> Result<Vec<Alert>> {
    let mut alerts = Vec::new();

    let stale_payments: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE center = ?1 AND status = 'Pending' AND created_at < ?2",
    )
    .bind(center)
    .bind(now - DAY)
    .fetch_one(pool)
    .await?;
    if stale_payments > 0 {
        alerts.push(Alert {
            kind: "warning",
            title: "Paiements en attente".to_string(),
            message: format!("{stale_payments} paiement(s) en attente depuis plus de 24h"),
            action: Some("/admin/payments?status=pending".to_string()),
        });
    }

    let inactive: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM   students s
        WHERE  s.center = ?1 AND s.status = 'Active'
          AND  COALESCE((SELECT MAX(modified_at) FROM enrollments WHERE student = s.id), 0) < ?2
        "#,
    )
    .bind(center)
    .bind(now - 7 * DAY)
    .fetch_one(pool)
    .await?;
    if inactive > 0 {
        alerts.push(Alert {
            kind: "info",
            title: "Étudiants inactifs".to_string(),
            message: format!("{inactive} étudiant(s) sans activité depuis 7 jours"),
            action: Some("/admin/students?status=inactive".to_string()),
        });
    }

    Ok(alerts)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub student_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ec_title: Option<String>,
    pub date: i64,
}

/// Payments and validations of a center, merged newest first. `None`
/// covers every center.
pub async fn recent_activity(pool: &SqlitePool, center: Option<&str>, limit: i64) -> Result<Vec<Activity>> {
    let mut activity = sqlx::query_as::<_, Activity>(
        r#"
        SELECT 'payment' AS kind, p.id, s.full_name AS student_name, p.amount, p.status,
               ec.title AS ec_title, p.created_at AS date
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN ecs ec ON ec.id = p.ec
        WHERE  ?1 IS NULL OR p.center = ?1
        ORDER  BY p.created_at DESC, p.id DESC
        LIMIT  ?2
        "#,
    )
    .bind(center)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let validations = sqlx::query_as::<_, Activity>(
        r#"
        SELECT 'validation' AS kind, e.id, s.full_name AS student_name, NULL AS amount,
               NULL AS status, ec.title AS ec_title, e.validation_date AS date
        FROM   enrollments e
        JOIN   students s ON s.id = e.student
        LEFT JOIN ecs ec ON ec.id = e.ec
        WHERE  (?1 IS NULL OR s.center = ?1)
          AND  e.status = 'Validated' AND e.validation_date IS NOT NULL
        ORDER  BY e.validation_date DESC, e.id DESC
        LIMIT  ?2
        "#,
    )
    .bind(center)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    activity.extend(validations);
    activity.sort_by(|a, b| b.date.cmp(&a.date));
    activity.truncate(limit.max(0) as usize);
    Ok(activity)
}

#[derive(Debug, Serialize)]
pub struct CenterDashboard {
    pub center: CenterRef,
    pub kpis: CenterKpis,
    pub trends: Vec<DayTrend>,
    pub alerts: Vec<Alert>,
    pub recent_activity: Vec<Activity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CenterQuery {
    pub center_id: Option<String>,
}

/// `GET center.get_center_dashboard`
pub async fn get_center_dashboard(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CenterQuery>,
) -> ApiResult<CenterDashboard> {
    let pool = &state.pool;
    let center = scoped_center(pool, &session, &q.center_id).await?;
    let today = period::today();
    Ok(reply(CenterDashboard {
        kpis: center_kpis(pool, &center.id, today).await?,
        trends: daily_trends(pool, &center.id, today, 30).await?,
        alerts: center_alerts(pool, &center.id, db::now()).await?,
        recent_activity: recent_activity(pool, Some(&center.id), 10).await?,
        center: center.into(),
    }))
}

// ─────────────────────────────────────────────────────────
// Students
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct StudentsQuery {
    pub center_id: Option<String>,
    pub status: Option<String>,
    pub year: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CenterStudent {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_year: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub total_ecs: i64,
    pub validated_ecs: i64,
    #[sqlx(skip)]
    pub progress: i64,
}

#[derive(Debug, Serialize)]
pub struct CenterStudents {
    pub students: Vec<CenterStudent>,
    pub total: i64,
}

const STUDENT_FILTER: &str = r#"
    WHERE  s.center = ?1
      AND  (?2 IS NULL OR s.status = ?2)
      AND  (?3 IS NULL OR s.current_year = ?3)
      AND  (?4 IS NULL OR instr(lower(s.full_name), ?4) > 0
                       OR instr(lower(COALESCE(s.email, '')), ?4) > 0
                       OR instr(lower(s.id), ?4) > 0)
"#;

pub async fn center_students(pool: &SqlitePool, center: &str, q: &StudentsQuery) -> Result<CenterStudents> {
    let (limit, offset) = page(q.limit, 20, q.offset);
    let search = non_empty(&q.search).map(str::to_lowercase);

    let sql = format!(
        r#"
        SELECT s.id, s.full_name, s.email, s.phone, s.current_year, s.status,
               s.created_at, s.modified_at,
               (SELECT COUNT(*) FROM enrollments WHERE student = s.id) AS total_ecs,
               (SELECT COUNT(*) FROM enrollments
                WHERE  student = s.id AND status = 'Validated') AS validated_ecs
        FROM   students s
        {STUDENT_FILTER}
        ORDER  BY s.full_name ASC, s.id ASC
        LIMIT  ?5 OFFSET ?6
        "#
    );
    let mut students = sqlx::query_as::<_, CenterStudent>(&sql)
        .bind(center)
        .bind(non_empty(&q.status))
        .bind(non_empty(&q.year))
        .bind(&search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    for s in &mut students {
        s.progress = percent0(s.validated_ecs, s.total_ecs);
    }

    let count_sql = format!("SELECT COUNT(*) FROM students s {STUDENT_FILTER}");
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(center)
        .bind(non_empty(&q.status))
        .bind(non_empty(&q.year))
        .bind(&search)
        .fetch_one(pool)
        .await?;

    Ok(CenterStudents { students, total })
}

/// `GET center.get_center_students`
pub async fn get_center_students(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<StudentsQuery>,
) -> ApiResult<CenterStudents> {
    let center = scoped_center(&state.pool, &session, &q.center_id).await?;
    Ok(reply(center_students(&state.pool, &center.id, &q).await?))
}

// ─────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PaymentsQuery {
    pub center_id: Option<String>,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CenterPayment {
    pub id: String,
    pub student: String,
    pub student_name: Option<String>,
    pub ec: String,
    pub ec_title: Option<String>,
    pub amount: i64,
    pub provider: String,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusTotal {
    pub count: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct CenterPayments {
    pub payments: Vec<CenterPayment>,
    pub total: i64,
    pub stats: BTreeMap<String, StatusTotal>,
}

const PAYMENT_FILTER: &str = r#"
    WHERE  p.center = ?1
      AND  (?2 IS NULL OR p.status = ?2)
      AND  (?3 IS NULL OR p.provider = ?3)
      AND  (?4 IS NULL OR p.created_at >= ?4)
      AND  (?5 IS NULL OR p.created_at < ?5)
      AND  (?6 IS NULL OR instr(lower(COALESCE(s.full_name, '')), ?6) > 0
                       OR instr(lower(p.id), ?6) > 0
                       OR instr(lower(COALESCE(ec.title, '')), ?6) > 0)
"#;

/// Payment status filter in either its stored or its client spelling.
fn status_filter(raw: &Option<String>) -> Result<Option<&'static str>> {
    non_empty(raw)
        .map(|s| {
            PaymentStatus::parse(s)
                .map(PaymentStatus::as_str)
                .ok_or_else(|| AppError::validation(format!("Statut inconnu: {s}")))
        })
        .transpose()
}

/// Amount and count per status, over `[since, ∞)` when given.
pub async fn stats_by_status(
    pool: &SqlitePool,
    center: Option<&str>,
    since: Option<i64>,
) -> Result<BTreeMap<String, StatusTotal>> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*), COALESCE(SUM(amount), 0)
        FROM   payments
        WHERE  (?1 IS NULL OR center = ?1) AND (?2 IS NULL OR created_at >= ?2)
        GROUP  BY status
        "#,
    )
    .bind(center)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(status, count, total)| (status, StatusTotal { count, total }))
        .collect())
}

pub async fn center_payments(pool: &SqlitePool, center: &str, q: &PaymentsQuery) -> Result<CenterPayments> {
    let (limit, offset) = page(q.limit, 20, q.offset);
    let status = status_filter(&q.status)?;
    let (from, to) = period::date_range(non_empty(&q.date_from), non_empty(&q.date_to))?;
    let search = non_empty(&q.search).map(str::to_lowercase);
    let provider = non_empty(&q.provider);

    let sql = format!(
        r#"
        SELECT p.id, p.student, s.full_name AS student_name, p.ec, ec.title AS ec_title,
               p.amount, p.provider, p.status, p.created_at, p.completed_at, p.failure_reason
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN ecs ec ON ec.id = p.ec
        {PAYMENT_FILTER}
        ORDER  BY p.created_at DESC, p.id DESC
        LIMIT  ?7 OFFSET ?8
        "#
    );
    let payments = sqlx::query_as::<_, CenterPayment>(&sql)
        .bind(center)
        .bind(status)
        .bind(provider)
        .bind(from)
        .bind(to)
        .bind(&search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let count_sql = format!(
        r#"
        SELECT COUNT(*)
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN ecs ec ON ec.id = p.ec
        {PAYMENT_FILTER}
        "#
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(center)
        .bind(status)
        .bind(provider)
        .bind(from)
        .bind(to)
        .bind(&search)
        .fetch_one(pool)
        .await?;

    Ok(CenterPayments {
        payments,
        total,
        stats: stats_by_status(pool, Some(center), None).await?,
    })
}

/// `GET center.get_center_payments`
pub async fn get_center_payments(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PaymentsQuery>,
) -> ApiResult<CenterPayments> {
    let center = scoped_center(&state.pool, &session, &q.center_id).await?;
    Ok(reply(center_payments(&state.pool, &center.id, &q).await?))
}

// ─────────────────────────────────────────────────────────
// Stats, listing and export
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StudentTotals {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct CenterStats {
    pub center: CenterRef,
    pub students: StudentTotals,
    pub payments: BTreeMap<String, StatusTotal>,
    pub enrollments: BTreeMap<String, i64>,
}

/// Enrollment counts per status, over every center when `center` is `None`.
pub async fn enrollments_by_status(pool: &SqlitePool, center: Option<&str>) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT e.status, COUNT(*)
        FROM   enrollments e JOIN students s ON s.id = e.student
        WHERE  ?1 IS NULL OR s.center = ?1
        GROUP  BY e.status
        "#,
    )
    .bind(center)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn center_stats(pool: &SqlitePool, center: Center, now: i64) -> Result<CenterStats> {
    let (total, active): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'Active' THEN 1 ELSE 0 END), 0)
        FROM   students
        WHERE  center = ?1
        "#,
    )
    .bind(&center.id)
    .fetch_one(pool)
    .await?;

    Ok(CenterStats {
        students: StudentTotals { total, active },
        payments: stats_by_status(pool, Some(&center.id), Some(now - 30 * DAY)).await?,
        enrollments: enrollments_by_status(pool, Some(&center.id)).await?,
        center: center.into(),
    })
}

/// `GET center.get_center_stats`
pub async fn get_center_stats(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CenterQuery>,
) -> ApiResult<CenterStats> {
    let center = scoped_center(&state.pool, &session, &q.center_id).await?;
    Ok(reply(center_stats(&state.pool, center, db::now()).await?))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CenterListing {
    pub id: String,
    pub center_name: String,
    pub region: Option<String>,
    pub is_active: bool,
    pub student_count: i64,
}

/// `GET center.get_all_centers`
pub async fn get_all_centers(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<Vec<CenterListing>> {
    session.require(PAYMENT_ADMINS)?;
    let centers = sqlx::query_as::<_, CenterListing>(
        r#"
        SELECT c.id, c.center_name, c.region, c.is_active,
               (SELECT COUNT(*) FROM students WHERE center = c.id) AS student_count
        FROM   centers c
        ORDER  BY c.region ASC, c.center_name ASC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(reply(centers))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ExportedStudent {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_year: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub total_ecs: i64,
    pub validated_ecs: i64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StudentExport {
    Csv { data: String, filename: String },
    Rows { students: Vec<ExportedStudent> },
}

pub const STUDENT_COLUMNS: [&str; 9] = [
    "ID",
    "Nom complet",
    "Email",
    "Téléphone",
    "Année",
    "Statut",
    "Date inscription",
    "Total EC",
    "EC validés",
];

pub async fn exported_students(pool: &SqlitePool, center: Option<&str>) -> Result<Vec<ExportedStudent>> {
    let rows = sqlx::query_as::<_, ExportedStudent>(
        r#"
        SELECT s.id, s.full_name, s.email, s.phone, s.current_year, s.status, s.created_at,
               COUNT(e.id) AS total_ecs,
               COALESCE(SUM(CASE WHEN e.status = 'Validated' THEN 1 ELSE 0 END), 0) AS validated_ecs
        FROM   students s
        LEFT JOIN enrollments e ON e.student = s.id
        WHERE  ?1 IS NULL OR s.center = ?1
        GROUP  BY s.id
        ORDER  BY s.full_name ASC, s.id ASC
        "#,
    )
    .bind(center)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub fn students_csv(students: &[ExportedStudent]) -> String {
    export::render(
        &STUDENT_COLUMNS,
        students.iter().map(|s| {
            vec![
                s.id.clone(),
                s.full_name.clone(),
                export::cell(s.email.as_deref()),
                export::cell(s.phone.as_deref()),
                export::cell(s.current_year.as_deref()),
                s.status.clone(),
                period::date_label(s.created_at),
                s.total_ecs.to_string(),
                s.validated_ecs.to_string(),
            ]
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub center_id: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "csv".to_string()
}

/// `GET center.export_students`
pub async fn export_students(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<ExportQuery>,
) -> ApiResult<StudentExport> {
    let center = scoped_center(&state.pool, &session, &q.center_id).await?;
    let students = exported_students(&state.pool, Some(&center.id)).await?;
    let export = if q.format.eq_ignore_ascii_case("csv") {
        StudentExport::Csv {
            data: students_csv(&students),
            filename: format!("etudiants_{}.csv", center.id),
        }
    } else {
        StudentExport::Rows { students }
    };
    Ok(reply(export))
}
