//! `national.*` routes: aggregates across every center, for the national
//! administration.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{non_empty, reply, ApiResult, ApiState};
use crate::auth::{Role, Session};
use crate::db;
use crate::enrollment::percent1;
use crate::errors::{AppError, Result};
use crate::export;
use crate::models::Center;
use crate::notify::format_ariary;
use crate::period::{self, Window, DAY};

const NATIONAL: &[Role] = &[Role::NationalAdmin];

// ─────────────────────────────────────────────────────────
// KPIs and per-center summaries
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
pub struct NationalKpis {
    pub total_students: i64,
    pub active_students: i64,
    pub total_centers: i64,
    pub total_ecs: i64,
    pub published_ecs: i64,
    pub total_courses: i64,
    pub total_enrollments: i64,
    pub validated_enrollments: i64,
    pub validation_rate: f64,
    pub payments_this_month: i64,
    pub revenue_this_month: i64,
    pub total_revenue: i64,
}

pub async fn national_kpis(pool: &SqlitePool, today: NaiveDate, now: i64) -> Result<NationalKpis> {
    let (total_students, total_centers, total_ecs, published_ecs, total_courses): (i64, i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM students),
                   (SELECT COUNT(*) FROM centers),
                   (SELECT COUNT(*) FROM ecs),
                   (SELECT COUNT(*) FROM ecs WHERE is_published = 1),
                   (SELECT COUNT(*) FROM courses)
            "#,
        )
        .fetch_one(pool)
        .await?;

    let (active_students, total_enrollments, validated_enrollments): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(DISTINCT CASE WHEN modified_at >= ?1 THEN student END),
               COUNT(*),
               COALESCE(SUM(CASE WHEN status = 'Validated' THEN 1 ELSE 0 END), 0)
        FROM   enrollments
        "#,
    )
    .bind(now - 30 * DAY)
    .fetch_one(pool)
    .await?;

    let (payments_this_month, revenue_this_month, total_revenue): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN COALESCE(completed_at, created_at) >= ?1 THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN COALESCE(completed_at, created_at) >= ?1 THEN amount ELSE 0 END), 0),
               COALESCE(SUM(amount), 0)
        FROM   payments
        WHERE  status = 'Completed'
        "#,
    )
    .bind(period::month_start(today))
    .fetch_one(pool)
    .await?;

    Ok(NationalKpis {
        total_students,
        active_students,
        total_centers,
        total_ecs,
        published_ecs,
        total_courses,
        total_enrollments,
        validated_enrollments,
        validation_rate: percent1(validated_enrollments, total_enrollments),
        payments_this_month,
        revenue_this_month,
        total_revenue,
    })
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CenterSummary {
    pub id: String,
    pub center_name: String,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub student_count: i64,
    pub payment_count: i64,
    pub revenue: i64,
    pub total_enrollments: i64,
    pub validated_enrollments: i64,
    #[sqlx(skip)]
    pub validation_rate: f64,
}

/// Every center with its students, completed payments and validation rate,
/// ordered by name.
pub async fn centers_summary(pool: &SqlitePool) -> Result<Vec<CenterSummary>> {
    let mut centers = sqlx::query_as::<_, CenterSummary>(
        r#"
        SELECT c.id, c.center_name, c.region, c.latitude, c.longitude,
               (SELECT COUNT(*) FROM students WHERE center = c.id) AS student_count,
               (SELECT COUNT(*) FROM payments
                WHERE  center = c.id AND status = 'Completed') AS payment_count,
               (SELECT COALESCE(SUM(amount), 0) FROM payments
                WHERE  center = c.id AND status = 'Completed') AS revenue,
               (SELECT COUNT(*) FROM enrollments e JOIN students s ON s.id = e.student
                WHERE  s.center = c.id) AS total_enrollments,
               (SELECT COUNT(*) FROM enrollments e JOIN students s ON s.id = e.student
                WHERE  s.center = c.id AND e.status = 'Validated') AS validated_enrollments
        FROM   centers c
        ORDER  BY c.center_name ASC, c.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    for c in &mut centers {
        c.validation_rate = percent1(c.validated_enrollments, c.total_enrollments);
    }
    Ok(centers)
}

fn by_revenue(centers: &mut [CenterSummary]) {
    centers.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct NationalTrend {
    pub month: String,
    pub enrollments: i64,
    pub payments: i64,
    pub revenue: i64,
    pub new_students: i64,
}

pub async fn national_trends(pool: &SqlitePool, windows: &[Window]) -> Result<Vec<NationalTrend>> {
    let Some(since) = windows.first().map(|w| w.start) else {
        return Ok(Vec::new());
    };
    let enrollments: Vec<i64> = sqlx::query_scalar("SELECT created_at FROM enrollments WHERE created_at >= ?1")
        .bind(since)
        .fetch_all(pool)
        .await?;
    let students: Vec<i64> = sqlx::query_scalar("SELECT created_at FROM students WHERE created_at >= ?1")
        .bind(since)
        .fetch_all(pool)
        .await?;
    let payments: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT COALESCE(completed_at, created_at), amount
        FROM   payments
        WHERE  status = 'Completed' AND COALESCE(completed_at, created_at) >= ?1
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let count_in = |w: &Window, ts: &[i64]| ts.iter().filter(|t| w.contains(**t)).count() as i64;
    Ok(windows
        .iter()
        .map(|w| {
            let paid: Vec<i64> = payments
                .iter()
                .filter(|(at, _)| w.contains(*at))
                .map(|(_, amount)| *amount)
                .collect();
            NationalTrend {
                month: w.label.clone(),
                enrollments: count_in(w, &enrollments),
                payments: paid.len() as i64,
                revenue: paid.iter().sum(),
                new_students: count_in(w, &students),
            }
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct NationalAlert {
    pub id: String,
    pub level: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<String>,
}

pub async fn national_alerts(
    pool: &SqlitePool,
    summaries: &[CenterSummary],
    today: NaiveDate,
    now: i64,
) -> Result<Vec<NationalAlert>> {
    let mut alerts = Vec::new();

    let quiet: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT c.id, c.center_name
        FROM   centers c
        WHERE  NOT EXISTS (SELECT 1 FROM payments p
                           WHERE  p.center = c.id AND p.created_at >= ?1)
        ORDER  BY c.center_name ASC
        LIMIT  3
        "#,
    )
    .bind(now - 30 * DAY)
    .fetch_all(pool)
    .await?;
    for (id, name) in quiet {
        alerts.push(NationalAlert {
            id: format!("inactive-{id}"),
            level: "warning",
            message: format!("Centre {name}: aucun paiement depuis 30 jours"),
            center: Some(id),
        });
    }

    let (pending, failed_today): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'Pending' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'Failed' AND created_at >= ?1 THEN 1 ELSE 0 END), 0)
        FROM   payments
        "#,
    )
    .bind(period::midnight(today))
    .fetch_one(pool)
    .await?;
    if pending > 10 {
        alerts.push(NationalAlert {
            id: "pending-payments".to_string(),
            level: "warning",
            message: format!("{pending} paiements en attente de confirmation"),
            center: None,
        });
    }
    if failed_today > 5 {
        alerts.push(NationalAlert {
            id: "failed-payments".to_string(),
            level: "error",
            message: format!("{failed_today} paiements échoués aujourd'hui"),
            center: None,
        });
    }

    for c in summaries
        .iter()
        .filter(|c| c.total_enrollments > 10 && c.validation_rate < 30.0)
        .take(2)
    {
        alerts.push(NationalAlert {
            id: format!("low-validation-{}", c.id),
            level: "warning",
            message: format!(
                "Centre {}: taux de validation bas ({}%)",
                c.center_name, c.validation_rate
            ),
            center: Some(c.id.clone()),
        });
    }

    alerts.truncate(5);
    Ok(alerts)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct NationalActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub center: Option<String>,
    pub time: i64,
}

/// Latest enrollments and completed payments, newest first.
pub async fn national_activity(pool: &SqlitePool, limit: i64) -> Result<Vec<NationalActivity>> {
    let enrollments: Vec<(String, Option<String>, Option<String>, Option<String>, i64)> =
        sqlx::query_as(
            r#"
            SELECT e.id, s.full_name, ec.title, c.center_name, e.created_at
            FROM   enrollments e
            LEFT JOIN students s ON s.id = e.student
            LEFT JOIN ecs ec ON ec.id = e.ec
            LEFT JOIN centers c ON c.id = s.center
            ORDER  BY e.created_at DESC, e.id DESC
            LIMIT  5
            "#,
        )
        .fetch_all(pool)
        .await?;
    let payments: Vec<(String, Option<String>, i64, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT p.id, s.full_name, p.amount, c.center_name, p.created_at
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN centers c ON c.id = p.center
        WHERE  p.status = 'Completed'
        ORDER  BY p.created_at DESC, p.id DESC
        LIMIT  5
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut activity: Vec<NationalActivity> = enrollments
        .into_iter()
        .map(|(id, student, ec, center, time)| NationalActivity {
            id: format!("enrollment-{id}"),
            kind: "enrollment".to_string(),
            description: format!(
                "{} inscrit à {}",
                student.as_deref().unwrap_or("Étudiant"),
                ec.as_deref().unwrap_or("EC")
            ),
            center,
            time,
        })
        .chain(payments.into_iter().map(|(id, student, amount, center, time)| {
            NationalActivity {
                id: format!("payment-{id}"),
                kind: "payment".to_string(),
                description: format!(
                    "Paiement {} de {}",
                    format_ariary(amount),
                    student.as_deref().unwrap_or("Étudiant")
                ),
                center,
                time,
            }
        }))
        .collect();
    activity.sort_by(|a, b| b.time.cmp(&a.time));
    activity.truncate(limit.max(0) as usize);
    Ok(activity)
}

#[derive(Debug, Serialize)]
pub struct NationalDashboard {
    pub kpis: NationalKpis,
    pub centers_summary: Vec<CenterSummary>,
    pub trends: Vec<NationalTrend>,
    pub alerts: Vec<NationalAlert>,
    pub top_centers: Vec<CenterSummary>,
    pub recent_activity: Vec<NationalActivity>,
}

/// `GET national.get_national_dashboard`
pub async fn get_national_dashboard(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<NationalDashboard> {
    session.require(NATIONAL)?;
    let pool = &state.pool;
    let today = period::today();
    let now = db::now();

    let centers = centers_summary(pool).await?;
    let mut top_centers = centers.clone();
    by_revenue(&mut top_centers);
    top_centers.truncate(5);

    Ok(reply(NationalDashboard {
        kpis: national_kpis(pool, today, now).await?,
        trends: national_trends(pool, &period::month_windows(today, 6)).await?,
        alerts: national_alerts(pool, &centers, today, now).await?,
        recent_activity: national_activity(pool, 10).await?,
        top_centers,
        centers_summary: centers,
    }))
}

#[derive(Debug, Serialize)]
pub struct AllCenters {
    pub centers: Vec<CenterSummary>,
    pub total: usize,
}

/// `GET national.get_all_centers`
pub async fn get_all_centers(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<AllCenters> {
    session.require(NATIONAL)?;
    let centers = centers_summary(&state.pool).await?;
    Ok(reply(AllCenters {
        total: centers.len(),
        centers,
    }))
}

// ─────────────────────────────────────────────────────────
// Center detail and comparison
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CenterPaymentTotals {
    pub total_payments: i64,
    pub total_revenue: i64,
    pub revenue_this_month: i64,
}

#[derive(Debug, Serialize)]
pub struct CenterDetailStats {
    pub student_count: i64,
    pub enrollments: BTreeMap<String, i64>,
    pub payments: CenterPaymentTotals,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MonthCount {
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CenterDetail {
    #[serde(flatten)]
    pub center: Center,
    pub stats: CenterDetailStats,
    pub trends: Vec<MonthCount>,
}

pub async fn center_detail(pool: &SqlitePool, center_id: &str, today: NaiveDate) -> Result<CenterDetail> {
    let center = db::fetch_center(pool, center_id).await?;

    let student_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE center = ?1")
        .bind(&center.id)
        .fetch_one(pool)
        .await?;
    let enrollments = crate::api::center::enrollments_by_status(pool, Some(&center.id)).await?;

    let (total_payments, total_revenue, revenue_this_month): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(amount), 0),
               COALESCE(SUM(CASE WHEN COALESCE(completed_at, created_at) >= ?2 THEN amount ELSE 0 END), 0)
        FROM   payments
        WHERE  center = ?1 AND status = 'Completed'
        "#,
    )
    .bind(&center.id)
    .bind(period::month_start(today))
    .fetch_one(pool)
    .await?;

    let windows = period::month_windows(today, 6);
    let since = windows.first().map(|w| w.start).unwrap_or_default();
    let created: Vec<i64> =
        sqlx::query_scalar("SELECT created_at FROM students WHERE center = ?1 AND created_at >= ?2")
            .bind(&center.id)
            .bind(since)
            .fetch_all(pool)
            .await?;
    let trends = windows
        .iter()
        .map(|w| MonthCount {
            month: w.label.clone(),
            count: created.iter().filter(|t| w.contains(**t)).count() as i64,
        })
        .collect();

    Ok(CenterDetail {
        center,
        stats: CenterDetailStats {
            student_count,
            enrollments,
            payments: CenterPaymentTotals {
                total_payments,
                total_revenue,
                revenue_this_month,
            },
        },
        trends,
    })
}

#[derive(Debug, Deserialize)]
pub struct CenterIdQuery {
    pub center_id: String,
}

/// `GET national.get_center_detail`
pub async fn get_center_detail(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CenterIdQuery>,
) -> ApiResult<CenterDetail> {
    session.require(NATIONAL)?;
    Ok(reply(center_detail(&state.pool, &q.center_id, period::today()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CompareBody {
    #[serde(default)]
    pub center_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Comparison {
    pub comparisons: Vec<CenterSummary>,
    pub metrics: [&'static str; 4],
}

pub async fn compare(pool: &SqlitePool, ids: &[String]) -> Result<Comparison> {
    if ids.iter().all(|id| id.trim().is_empty()) {
        return Err(AppError::validation("Sélectionnez au moins un centre"));
    }
    let mut comparisons: Vec<CenterSummary> = centers_summary(pool)
        .await?
        .into_iter()
        .filter(|c| ids.iter().any(|id| id.trim() == c.id))
        .collect();
    by_revenue(&mut comparisons);
    Ok(Comparison {
        comparisons,
        metrics: ["student_count", "total_enrollments", "validation_rate", "revenue"],
    })
}

/// `POST national.compare_centers`
pub async fn compare_centers(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<CompareBody>,
) -> ApiResult<Comparison> {
    session.require(NATIONAL)?;
    Ok(reply(compare(&state.pool, &body.center_ids).await?))
}

// ─────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Summary,
    Centers,
    Students,
    Payments,
}

impl ReportType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "summary" => Some(Self::Summary),
            "centers" => Some(Self::Centers),
            "students" => Some(Self::Students),
            "payments" => Some(Self::Payments),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Centers => "centers",
            Self::Students => "students",
            Self::Payments => "payments",
        }
    }
}

pub fn summary_csv(kpis: &NationalKpis, today: NaiveDate) -> String {
    let mut out = export::render(
        &["Rapport National CNTEMAD", &today.format("%d/%m/%Y").to_string()],
        Vec::<Vec<String>>::new(),
    );
    out.push('\n');
    out.push_str(&export::render(
        &["Indicateur", "Valeur"],
        [
            ("Total étudiants", kpis.total_students.to_string()),
            ("Étudiants actifs", kpis.active_students.to_string()),
            ("Total centres", kpis.total_centers.to_string()),
            ("Total EC", kpis.total_ecs.to_string()),
            ("Inscriptions totales", kpis.total_enrollments.to_string()),
            ("Inscriptions validées", kpis.validated_enrollments.to_string()),
            ("Taux de validation", format!("{}%", kpis.validation_rate)),
            ("Revenus ce mois", format_ariary(kpis.revenue_this_month)),
            ("Revenus totaux", format_ariary(kpis.total_revenue)),
        ]
        .into_iter()
        .map(|(label, value)| vec![label.to_string(), value]),
    ));
    out
}

pub fn centers_csv(centers: &[CenterSummary]) -> String {
    export::render(
        &[
            "Centre",
            "Région",
            "Étudiants",
            "Paiements",
            "Revenus (Ar)",
            "Taux validation (%)",
        ],
        centers.iter().map(|c| {
            vec![
                c.center_name.clone(),
                export::cell(c.region.as_deref()),
                c.student_count.to_string(),
                c.payment_count.to_string(),
                c.revenue.to_string(),
                c.validation_rate.to_string(),
            ]
        }),
    )
}

async fn students_csv(pool: &SqlitePool, from: Option<i64>, to: Option<i64>) -> Result<String> {
    let rows: Vec<(String, String, Option<String>, Option<String>, Option<String>, Option<String>, i64)> =
        sqlx::query_as(
            r#"
            SELECT s.id, s.full_name, s.email, s.phone, c.center_name, s.current_year, s.created_at
            FROM   students s
            LEFT JOIN centers c ON c.id = s.center
            WHERE  (?1 IS NULL OR s.created_at >= ?1) AND (?2 IS NULL OR s.created_at < ?2)
            ORDER  BY s.created_at DESC, s.id ASC
            LIMIT  10000
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
    Ok(export::render(
        &[
            "ID",
            "Nom complet",
            "Email",
            "Téléphone",
            "Centre",
            "Année",
            "Date inscription",
        ],
        rows.into_iter()
            .map(|(id, name, email, phone, center, year, created)| {
                vec![
                    id,
                    name,
                    export::cell(email.as_deref()),
                    export::cell(phone.as_deref()),
                    export::cell(center.as_deref()),
                    export::cell(year.as_deref()),
                    period::date_label(created),
                ]
            }),
    ))
}

async fn payments_csv(pool: &SqlitePool, from: Option<i64>, to: Option<i64>) -> Result<String> {
    let rows: Vec<(String, Option<String>, i64, String, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT p.id, s.full_name, p.amount, p.provider, c.center_name, p.created_at
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN centers c ON c.id = p.center
        WHERE  p.status = 'Completed'
          AND  (?1 IS NULL OR p.created_at >= ?1) AND (?2 IS NULL OR p.created_at < ?2)
        ORDER  BY p.created_at DESC, p.id ASC
        LIMIT  10000
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(export::render(
        &["Référence", "Étudiant", "Montant (Ar)", "Provider", "Centre", "Date"],
        rows.into_iter()
            .map(|(id, student, amount, provider, center, created)| {
                vec![
                    id,
                    export::cell(student.as_deref()),
                    amount.to_string(),
                    provider,
                    export::cell(center.as_deref()),
                    period::date_label(created),
                ]
            }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub report_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub data: String,
    pub filename: String,
}

pub async fn national_report(pool: &SqlitePool, q: &ReportQuery, today: NaiveDate) -> Result<Report> {
    let raw = non_empty(&q.report_type).unwrap_or("summary");
    let kind = ReportType::parse(raw)
        .ok_or_else(|| AppError::validation(format!("Type de rapport inconnu: {raw}")))?;
    let (from, to) = period::date_range(non_empty(&q.date_from), non_empty(&q.date_to))?;

    let data = match kind {
        ReportType::Summary => summary_csv(&national_kpis(pool, today, db::now()).await?, today),
        ReportType::Centers => centers_csv(&centers_summary(pool).await?),
        ReportType::Students => students_csv(pool, from, to).await?,
        ReportType::Payments => payments_csv(pool, from, to).await?,
    };
    Ok(Report {
        data,
        filename: format!("cntemad_{}_{}.csv", kind.as_str(), today.format("%Y%m%d")),
    })
}

/// `GET national.export_national_report`
pub async fn export_national_report(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Report> {
    session.require(NATIONAL)?;
    Ok(reply(national_report(&state.pool, &q, period::today()).await?))
}

// ─────────────────────────────────────────────────────────
// Map
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

pub const MADAGASCAR: Bounds = Bounds {
    north: -11.95,
    south: -25.60,
    east: 50.48,
    west: 43.18,
};

#[derive(Debug, Serialize)]
pub struct CentersMap {
    pub centers: Vec<CenterSummary>,
    pub bounds: Bounds,
}

/// Smallest box holding every located center; Madagascar when none is.
pub fn bounds_of(centers: &[CenterSummary]) -> Bounds {
    let points: Vec<(f64, f64)> = centers
        .iter()
        .filter_map(|c| Some((c.latitude?, c.longitude?)))
        .collect();
    if points.is_empty() {
        return MADAGASCAR;
    }
    let mut b = Bounds {
        north: f64::MIN,
        south: f64::MAX,
        east: f64::MIN,
        west: f64::MAX,
    };
    for (lat, lng) in points {
        b.north = b.north.max(lat);
        b.south = b.south.min(lat);
        b.east = b.east.max(lng);
        b.west = b.west.min(lng);
    }
    b
}

/// `GET national.get_centers_map_data`
pub async fn get_centers_map_data(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<CentersMap> {
    session.require(NATIONAL)?;
    let centers: Vec<CenterSummary> = centers_summary(&state.pool)
        .await?
        .into_iter()
        .filter(|c| c.latitude.is_some() && c.longitude.is_some())
        .collect();
    Ok(reply(CentersMap {
        bounds: bounds_of(&centers),
        centers,
    }))
}
