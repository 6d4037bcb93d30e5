//! `ec.*` routes: the EC catalog, lesson content and lesson progress.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{non_empty, page, reply, ApiResult, ApiState};
use crate::auth::{self, Session};
use crate::db;
use crate::enrollment;
use crate::errors::{AppError, Result};
use crate::models::{Ec, EnrollmentStatus, Lesson, YEARS};

fn user_status(status: Option<EnrollmentStatus>) -> &'static str {
    status.map(EnrollmentStatus::slug).unwrap_or("not_paid")
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EcCard {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub course: Option<String>,
    pub year: Option<String>,
    pub price: i64,
    pub duration_hours: i64,
    pub image: Option<String>,
    pub created_at: i64,
    #[serde(skip)]
    pub enrollment_status: Option<EnrollmentStatus>,
    #[sqlx(skip)]
    pub user_status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EcCatalog {
    pub ecs: Vec<EcCard>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub year: Option<String>,
    pub course: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Published ECs matching the filters, with the caller's enrollment status.
pub async fn catalog(
    pool: &SqlitePool,
    student: Option<&str>,
    q: &CatalogQuery,
) -> Result<EcCatalog> {
    let (limit, offset) = page(q.limit, 20, q.offset);
    let order = match non_empty(&q.sort_by) {
        Some("title") => "ec.title ASC, ec.id ASC",
        Some("price") => "ec.price ASC, ec.id ASC",
        None => "ec.title ASC, ec.id ASC",
        Some(_) => "ec.created_at DESC, ec.id DESC",
    };
    let filter = r#"
        WHERE  ec.is_published = 1
          AND  (?2 IS NULL OR ec.year = ?2)
          AND  (?3 IS NULL OR ec.course = ?3)
          AND  (?4 IS NULL
                OR instr(lower(ec.title), lower(?4)) > 0
                OR instr(lower(COALESCE(ec.description, '')), lower(?4)) > 0)
    "#;

    let sql = format!(
        r#"
        SELECT ec.id, ec.title, ec.description, ec.course, ec.year, ec.price,
               ec.duration_hours, ec.image, ec.created_at, e.status AS enrollment_status
        FROM   ecs ec
        LEFT JOIN enrollments e ON e.ec = ec.id AND e.student = ?1
        {filter}
        ORDER  BY {order}
        LIMIT  ?5 OFFSET ?6
        "#
    );
    let mut ecs = sqlx::query_as::<_, EcCard>(&sql)
        .bind(student)
        .bind(non_empty(&q.year))
        .bind(non_empty(&q.course))
        .bind(non_empty(&q.search))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    for ec in &mut ecs {
        ec.user_status = user_status(ec.enrollment_status);
    }

    let count_sql = format!("SELECT COUNT(*) FROM ecs ec {filter}");
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(student)
        .bind(non_empty(&q.year))
        .bind(non_empty(&q.course))
        .bind(non_empty(&q.search))
        .fetch_one(pool)
        .await?;

    Ok(EcCatalog {
        has_more: offset + (ecs.len() as i64) < total,
        ecs,
        total,
    })
}

async fn student_id(pool: &SqlitePool, session: &Session) -> Result<Option<String>> {
    Ok(auth::current_student(pool, session).await?.map(|s| s.id))
}

/// `GET ec.get_available_ecs`
pub async fn get_available_ecs(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CatalogQuery>,
) -> ApiResult<EcCatalog> {
    let student = student_id(&state.pool, &session).await?;
    Ok(reply(catalog(&state.pool, student.as_deref(), &q).await?))
}

#[derive(Debug, Deserialize)]
pub struct EcQuery {
    pub ec_id: String,
}

#[derive(Debug, Serialize)]
pub struct EcDetail {
    pub name: String,
    pub code: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub course: Option<String>,
    pub course_title: Option<String>,
    pub year: Option<String>,
    pub price: i64,
    pub duration_hours: i64,
    pub image: Option<String>,
    pub user_status: &'static str,
    pub content: Option<String>,
    pub quiz_id: Option<String>,
}

/// `GET ec.get_ec_detail`
pub async fn get_ec_detail(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<EcQuery>,
) -> ApiResult<EcDetail> {
    let pool = &state.pool;
    let ec = db::fetch_ec(pool, &q.ec_id).await?;
    let course_title = match &ec.course {
        Some(course) => sqlx::query_scalar("SELECT title FROM courses WHERE id = ?1")
            .bind(course)
            .fetch_optional(pool)
            .await?,
        None => None,
    };

    let status = match student_id(pool, &session).await? {
        Some(student) => enrollment::find_enrollment(pool, &student, &ec.id)
            .await?
            .map(|e| e.status),
        None => None,
    };
    let (content, quiz_id) = if status.is_some() {
        let quiz_id: Option<String> = sqlx::query_scalar("SELECT id FROM quizzes WHERE ec = ?1")
            .bind(&ec.id)
            .fetch_optional(pool)
            .await?;
        (ec.content.clone(), quiz_id)
    } else {
        (None, None)
    };

    Ok(reply(EcDetail {
        name: ec.id,
        code: ec.code,
        title: ec.title,
        description: ec.description,
        course: ec.course,
        course_title,
        year: ec.year,
        price: ec.price,
        duration_hours: ec.duration_hours,
        image: ec.image,
        user_status: user_status(status),
        content,
        quiz_id,
    }))
}

// ─────────────────────────────────────────────────────────
// Lessons
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LessonView {
    pub name: String,
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub content_type: String,
}

/// `video`, then the stored type, then a PDF sniff, then `text`.
pub fn content_type(video_url: Option<&str>, stored: Option<&str>, content: Option<&str>) -> String {
    if video_url.is_some_and(|v| !v.is_empty()) {
        return "video".to_string();
    }
    if let Some(stored) = stored.filter(|s| !s.is_empty()) {
        return stored.to_lowercase();
    }
    let content = content.unwrap_or_default().to_lowercase();
    if content.contains(".pdf") || content.contains("application/pdf") {
        return "pdf".to_string();
    }
    "text".to_string()
}

pub async fn lessons_of(pool: &SqlitePool, ec: &str) -> Result<Vec<Lesson>> {
    let rows = sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE ec = ?1 ORDER BY idx ASC")
        .bind(ec)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Lessons of an EC. Without stored lessons the EC body becomes a single
/// lesson, and an empty EC gets two placeholders.
pub async fn ec_lessons(pool: &SqlitePool, ec: &Ec) -> Result<Vec<LessonView>> {
    let stored = lessons_of(pool, &ec.id).await?;
    if !stored.is_empty() {
        return Ok(stored
            .into_iter()
            .map(|l| LessonView {
                content_type: content_type(
                    l.video_url.as_deref(),
                    l.content_type.as_deref(),
                    l.content.as_deref(),
                ),
                name: l.id,
                title: l.title,
                content: l.content,
                video_url: l.video_url,
            })
            .collect());
    }

    if let Some(content) = ec.content.as_deref().filter(|c| !c.trim().is_empty()) {
        return Ok(vec![LessonView {
            name: format!("{}-main", ec.id),
            title: ec.title.clone(),
            content: Some(content.to_string()),
            video_url: None,
            content_type: "text".to_string(),
        }]);
    }

    Ok(vec![
        LessonView {
            name: format!("{}-intro", ec.id),
            title: "Introduction".to_string(),
            content: Some(format!(
                "<h2>Bienvenue dans {}</h2><p>Ce module vous permettra d'apprendre les concepts fondamentaux.</p>",
                ec.title
            )),
            video_url: None,
            content_type: "text".to_string(),
        },
        LessonView {
            name: format!("{}-content", ec.id),
            title: "Contenu principal".to_string(),
            content: Some("<p>Le contenu de cette leçon sera bientôt disponible.</p>".to_string()),
            video_url: None,
            content_type: "text".to_string(),
        },
    ])
}

#[derive(Debug, Serialize)]
pub struct EcSummary {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub is_paid: bool,
    pub quiz_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonProgress {
    pub completed_lessons: Vec<String>,
    pub total_lessons: usize,
}

#[derive(Debug, Serialize)]
pub struct EcContent {
    pub ec: EcSummary,
    pub lessons: Vec<LessonView>,
    pub progress: Option<LessonProgress>,
}

/// `GET ec.get_ec_content`
pub async fn get_ec_content(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<EcQuery>,
) -> ApiResult<EcContent> {
    let pool = &state.pool;
    let student = auth::require_student(pool, &session).await?;
    let ec = db::fetch_ec(pool, &q.ec_id).await?;
    let enrollment = enrollment::find_enrollment(pool, &student.id, &ec.id).await?;
    let quiz_id: Option<String> = sqlx::query_scalar("SELECT id FROM quizzes WHERE ec = ?1")
        .bind(&ec.id)
        .fetch_optional(pool)
        .await?;

    let summary = EcSummary {
        name: ec.id.clone(),
        title: ec.title.clone(),
        description: ec.description.clone(),
        is_paid: enrollment.is_some(),
        quiz_id,
    };
    let Some(enrollment) = enrollment else {
        return Ok(reply(EcContent {
            ec: summary,
            lessons: Vec::new(),
            progress: None,
        }));
    };

    let lessons = ec_lessons(pool, &ec).await?;
    Ok(reply(EcContent {
        ec: summary,
        progress: Some(LessonProgress {
            completed_lessons: enrollment.completed_lessons(),
            total_lessons: lessons.len(),
        }),
        lessons,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LessonProgressBody {
    pub ec_id: String,
    pub lesson_id: String,
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct LessonProgressUpdate {
    pub completed_lessons: Vec<String>,
    pub status: EnrollmentStatus,
}

/// Mark a lesson done (or not). Starting a lesson moves `Paid` to `In Progress`.
pub async fn set_lesson_progress(
    pool: &SqlitePool,
    student: &str,
    body: &LessonProgressBody,
) -> Result<LessonProgressUpdate> {
    let enrollment = enrollment::find_enrollment(pool, student, &body.ec_id)
        .await?
        .ok_or_else(|| AppError::not_found("Inscription non trouvée"))?;

    let mut completed = enrollment.completed_lessons();
    let known = completed.iter().position(|l| *l == body.lesson_id);
    match (body.completed, known) {
        (true, None) => completed.push(body.lesson_id.clone()),
        (false, Some(i)) => {
            completed.remove(i);
        }
        _ => {}
    }
    let status = match enrollment.status {
        EnrollmentStatus::Paid => EnrollmentStatus::InProgress,
        other => other,
    };

    sqlx::query(
        r#"
        UPDATE enrollments
        SET    completed_lessons = ?2,
               status = CASE WHEN status = 'Paid' THEN 'In Progress' ELSE status END,
               modified_at = ?3
        WHERE  id = ?1
        "#,
    )
    .bind(&enrollment.id)
    .bind(serde_json::to_string(&completed)?)
    .bind(db::now())
    .execute(pool)
    .await?;

    Ok(LessonProgressUpdate {
        completed_lessons: completed,
        status,
    })
}

/// `POST ec.update_lesson_progress`
pub async fn update_lesson_progress(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<LessonProgressBody>,
) -> ApiResult<LessonProgressUpdate> {
    let student = auth::require_student(&state.pool, &session).await?;
    Ok(reply(set_lesson_progress(&state.pool, &student.id, &body).await?))
}

// ─────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

/// `GET ec.get_years`
pub async fn get_years() -> ApiResult<Vec<FilterOption>> {
    Ok(reply(
        YEARS
            .iter()
            .map(|(value, label)| FilterOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect(),
    ))
}

/// `GET ec.get_courses_for_filter`
pub async fn get_courses_for_filter(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Vec<FilterOption>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, title FROM courses WHERE is_published = 1 ORDER BY title ASC",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(reply(
        rows.into_iter()
            .map(|(value, label)| FilterOption { value, label })
            .collect(),
    ))
}
