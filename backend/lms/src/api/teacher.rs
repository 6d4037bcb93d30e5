//! `teacher.*` routes: course and EC authoring for instructors.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::{non_empty, reply, ApiResult, ApiState};
use crate::api::ec::lessons_of;
use crate::auth::{CurrentUser, Role, Session};
use crate::db;
use crate::enrollment::{percent1, round1};
use crate::errors::{AppError, Result};
use crate::models::{Course, Ec, EnrollmentStatus, Lesson, YEARS};
use crate::period::{self, Window};
use crate::quiz::{self, EditableQuiz, QuizDraft};

const AUTHORS: &[Role] = &[Role::Instructor];

/// Instructors edit the courses they own or teach; national admins edit all.
fn ensure_course_editor(user: &CurrentUser, course: &Course) -> Result<()> {
    if user.is_national_admin()
        || course.owner.as_deref() == Some(user.email.as_str())
        || course.instructor.as_deref() == Some(user.email.as_str())
    {
        Ok(())
    } else {
        Err(AppError::forbidden("Vous n'êtes pas responsable de ce cours"))
    }
}

/// An EC is editable when its course is, or when it has no course.
async fn editable_ec(pool: &SqlitePool, user: &CurrentUser, ec_id: &str) -> Result<Ec> {
    let ec = db::fetch_ec(pool, ec_id).await?;
    if let Some(course) = &ec.course {
        let course = db::fetch_course(pool, course).await?;
        ensure_course_editor(user, &course)?;
    }
    Ok(ec)
}

fn check_year(year: Option<&str>) -> Result<()> {
    match year {
        Some(y) if !YEARS.iter().any(|(code, _)| *code == y) => {
            Err(AppError::validation(format!("Année invalide: {y}")))
        }
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────
// Courses
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TeacherCourse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub year: Option<String>,
    pub is_published: bool,
    pub image: Option<String>,
    pub ec_count: i64,
    pub student_count: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TeacherCourses {
    pub courses: Vec<TeacherCourse>,
    pub total: usize,
}

pub async fn courses_of(pool: &SqlitePool, email: &str) -> Result<Vec<TeacherCourse>> {
    let rows = sqlx::query_as::<_, TeacherCourse>(
        r#"
        SELECT c.id, c.title, c.description, c.year, c.is_published, c.image,
               (SELECT COUNT(*) FROM ecs WHERE course = c.id) AS ec_count,
               (SELECT COUNT(DISTINCT e.student)
                FROM   enrollments e JOIN ecs ON ecs.id = e.ec
                WHERE  ecs.course = c.id) AS student_count,
               c.created_at, c.modified_at
        FROM   courses c
        WHERE  c.instructor = ?1 OR c.owner = ?1
        ORDER  BY c.modified_at DESC, c.id ASC
        "#,
    )
    .bind(email)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `GET teacher.get_my_courses`
pub async fn get_my_courses(
    State(state): State<Arc<ApiState>>,
    session: Session,
) -> ApiResult<TeacherCourses> {
    let user = session.require(AUTHORS)?;
    let courses = courses_of(&state.pool, &user.email).await?;
    Ok(reply(TeacherCourses {
        total: courses.len(),
        courses,
    }))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CourseEcStats {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_hours: i64,
    pub is_published: bool,
    pub image: Option<String>,
    pub student_count: i64,
    pub validated_count: i64,
    #[sqlx(skip)]
    pub validation_rate: f64,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Serialize)]
pub struct CourseHeader {
    pub name: String,
    pub title: String,
    pub year: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CourseEcs {
    pub ecs: Vec<CourseEcStats>,
    pub course: CourseHeader,
}

#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    pub course_id: String,
}

/// `GET teacher.get_course_ecs`
pub async fn get_course_ecs(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CourseQuery>,
) -> ApiResult<CourseEcs> {
    session.require(AUTHORS)?;
    let course = db::fetch_course(&state.pool, &q.course_id).await?;
    let mut ecs = sqlx::query_as::<_, CourseEcStats>(
        r#"
        SELECT ec.id, ec.title, ec.description, ec.price, ec.duration_hours,
               ec.is_published, ec.image,
               (SELECT COUNT(*) FROM enrollments WHERE ec = ec.id) AS student_count,
               (SELECT COUNT(*) FROM enrollments
                WHERE  ec = ec.id AND status = 'Validated') AS validated_count,
               ec.created_at, ec.modified_at
        FROM   ecs ec
        WHERE  ec.course = ?1
        ORDER  BY ec.created_at ASC, ec.id ASC
        "#,
    )
    .bind(&course.id)
    .fetch_all(&state.pool)
    .await?;
    for ec in &mut ecs {
        ec.validation_rate = percent1(ec.validated_count, ec.student_count);
    }
    Ok(reply(CourseEcs {
        ecs,
        course: CourseHeader {
            name: course.id,
            title: course.title,
            year: course.year,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct CourseDraft {
    pub course_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<String>,
    pub image: Option<String>,
    pub center: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Saved {
    pub name: String,
    pub message: String,
}

pub async fn save_course_draft(pool: &SqlitePool, user: &CurrentUser, draft: &CourseDraft) -> Result<Saved> {
    let year = non_empty(&draft.year);
    check_year(year)?;
    let title = non_empty(&draft.title);
    let now = db::now();

    if let Some(id) = non_empty(&draft.course_id) {
        let course = db::fetch_course(pool, id).await?;
        ensure_course_editor(user, &course)?;
        sqlx::query(
            r#"
            UPDATE courses
            SET    title = COALESCE(?2, title),
                   description = COALESCE(?3, description),
                   year = COALESCE(?4, year),
                   image = COALESCE(?5, image),
                   center = COALESCE(?6, center),
                   is_published = COALESCE(?7, is_published),
                   modified_at = ?8
            WHERE  id = ?1
            "#,
        )
        .bind(&course.id)
        .bind(title)
        .bind(draft.description.as_deref())
        .bind(year)
        .bind(non_empty(&draft.image))
        .bind(non_empty(&draft.center))
        .bind(draft.is_published)
        .bind(now)
        .execute(pool)
        .await?;
        info!("Course {} updated by {}", course.id, user.email);
        return Ok(Saved {
            name: course.id,
            message: "Cours mis à jour avec succès".to_string(),
        });
    }

    let title = title.ok_or_else(|| AppError::validation("Le titre est requis"))?;
    let id = db::new_id("CRS");
    sqlx::query(
        r#"
        INSERT INTO courses
            (id, title, description, year, image, center, instructor, owner,
             is_published, created_at, modified_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(draft.description.as_deref())
    .bind(year)
    .bind(non_empty(&draft.image))
    .bind(non_empty(&draft.center))
    .bind(&user.email)
    .bind(draft.is_published.unwrap_or(false))
    .bind(now)
    .execute(pool)
    .await?;
    info!("Course {id} created by {}", user.email);
    Ok(Saved {
        name: id,
        message: "Cours créé avec succès".to_string(),
    })
}

/// `POST teacher.save_course`
pub async fn save_course(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<CourseDraft>,
) -> ApiResult<Saved> {
    let user = session.require(AUTHORS)?;
    Ok(reply(save_course_draft(&state.pool, user, &body).await?))
}

// ─────────────────────────────────────────────────────────
// ECs
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EcQuery {
    pub ec_id: String,
}

#[derive(Debug, Serialize)]
pub struct EcForEdit {
    #[serde(flatten)]
    pub ec: Ec,
    pub quiz: Option<EditableQuiz>,
    pub lessons: Vec<Lesson>,
}

/// `GET teacher.get_ec_for_edit`
pub async fn get_ec_for_edit(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<EcQuery>,
) -> ApiResult<EcForEdit> {
    session.require(AUTHORS)?;
    let ec = db::fetch_ec(&state.pool, &q.ec_id).await?;
    let quiz = quiz::quiz_for_edit(&state.pool, &ec).await?;
    let lessons = lessons_of(&state.pool, &ec.id).await?;
    Ok(reply(EcForEdit { ec, quiz, lessons }))
}

#[derive(Debug, Default, Deserialize)]
pub struct EcDraft {
    pub ec_id: Option<String>,
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub course: Option<String>,
    pub year: Option<String>,
    pub price: Option<i64>,
    pub duration_hours: Option<i64>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
    pub image: Option<String>,
}

/// Create or update an EC, keeping `courses.ec_count` of the old and new
/// parent course in step.
pub async fn save_ec_draft(pool: &SqlitePool, user: &CurrentUser, draft: &EcDraft) -> Result<Saved> {
    if draft.price.is_some_and(|p| p < 0) {
        return Err(AppError::validation("Le prix doit être positif"));
    }
    if draft.duration_hours.is_some_and(|d| d < 0) {
        return Err(AppError::validation("La durée doit être positive"));
    }
    let year = non_empty(&draft.year);
    check_year(year)?;
    let course = match non_empty(&draft.course) {
        Some(id) => {
            let course = db::fetch_course(pool, id).await?;
            ensure_course_editor(user, &course)?;
            Some(course.id)
        }
        None => None,
    };
    let now = db::now();

    let existing = match non_empty(&draft.ec_id) {
        Some(id) => Some(editable_ec(pool, user, id).await?),
        None => None,
    };

    let mut tx = pool.begin().await?;
    let (id, message) = if let Some(ec) = existing {
        sqlx::query(
            r#"
            UPDATE ecs
            SET    title = COALESCE(?2, title),
                   code = COALESCE(?3, code),
                   description = COALESCE(?4, description),
                   course = COALESCE(?5, course),
                   year = COALESCE(?6, year),
                   price = COALESCE(?7, price),
                   duration_hours = COALESCE(?8, duration_hours),
                   content = COALESCE(?9, content),
                   is_published = COALESCE(?10, is_published),
                   image = COALESCE(?11, image),
                   modified_at = ?12
            WHERE  id = ?1
            "#,
        )
        .bind(&ec.id)
        .bind(non_empty(&draft.title))
        .bind(non_empty(&draft.code))
        .bind(draft.description.as_deref())
        .bind(&course)
        .bind(year)
        .bind(draft.price)
        .bind(draft.duration_hours)
        .bind(draft.content.as_deref())
        .bind(draft.is_published)
        .bind(non_empty(&draft.image))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let (Some(old), Some(new)) = (&ec.course, &course) {
            if old != new {
                db::recompute_ec_count(&mut *tx, old).await?;
            }
        }
        (ec.id, "EC mis à jour avec succès")
    } else {
        let title = non_empty(&draft.title).ok_or_else(|| AppError::validation("Le titre est requis"))?;
        let id = db::new_id("EC");
        sqlx::query(
            r#"
            INSERT INTO ecs
                (id, code, title, description, course, year, price, duration_hours,
                 content, is_published, image, created_at, modified_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
        )
        .bind(&id)
        .bind(non_empty(&draft.code))
        .bind(title)
        .bind(draft.description.as_deref())
        .bind(&course)
        .bind(year)
        .bind(draft.price.unwrap_or(0))
        .bind(draft.duration_hours.unwrap_or(0))
        .bind(draft.content.as_deref())
        .bind(draft.is_published.unwrap_or(false))
        .bind(non_empty(&draft.image))
        .bind(now)
        .execute(&mut *tx)
        .await?;
        (id, "EC créé avec succès")
    };

    let current: Option<String> = sqlx::query_scalar("SELECT course FROM ecs WHERE id = ?1")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
    if let Some(course) = current {
        db::recompute_ec_count(&mut *tx, &course).await?;
    }
    tx.commit().await?;

    info!("EC {id} saved by {}", user.email);
    Ok(Saved {
        name: id,
        message: message.to_string(),
    })
}

/// `POST teacher.save_ec`
pub async fn save_ec(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<EcDraft>,
) -> ApiResult<Saved> {
    let user = session.require(AUTHORS)?;
    Ok(reply(save_ec_draft(&state.pool, user, &body).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LessonDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EcContentBody {
    pub ec_id: String,
    #[serde(default)]
    pub lessons: Vec<LessonDraft>,
}

#[derive(Debug, Serialize)]
pub struct Done {
    pub success: bool,
    pub message: String,
}

/// Replace the lessons of an EC.
pub async fn replace_lessons(pool: &SqlitePool, ec: &Ec, lessons: &[LessonDraft]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lessons WHERE ec = ?1")
        .bind(&ec.id)
        .execute(&mut *tx)
        .await?;
    for (i, lesson) in lessons.iter().enumerate() {
        let idx = i as i64 + 1;
        let title = non_empty(&lesson.title)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Leçon {idx}"));
        sqlx::query(
            r#"
            INSERT INTO lessons (id, ec, title, content, video_url, content_type, idx)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(db::new_id("LSN"))
        .bind(&ec.id)
        .bind(title)
        .bind(lesson.content.as_deref().unwrap_or_default())
        .bind(non_empty(&lesson.video_url))
        .bind(non_empty(&lesson.content_type).unwrap_or("Text"))
        .bind(idx)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(lessons.len())
}

/// `POST teacher.save_ec_content`
pub async fn save_ec_content(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<EcContentBody>,
) -> ApiResult<Done> {
    let user = session.require(AUTHORS)?;
    let ec = editable_ec(&state.pool, user, &body.ec_id).await?;
    let count = replace_lessons(&state.pool, &ec, &body.lessons).await?;
    info!("{count} lesson(s) saved on EC {} by {}", ec.id, user.email);
    Ok(reply(Done {
        success: true,
        message: format!("{count} leçon(s) enregistrée(s)"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SaveQuizBody {
    pub ec_id: String,
    #[serde(default)]
    pub quiz_data: QuizDraft,
}

#[derive(Debug, Serialize)]
pub struct SavedQuiz {
    pub success: bool,
    pub quiz_id: String,
    pub message: String,
}

/// `POST teacher.save_quiz`
pub async fn save_quiz(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<SaveQuizBody>,
) -> ApiResult<SavedQuiz> {
    let user = session.require(AUTHORS)?;
    let ec = editable_ec(&state.pool, user, &body.ec_id).await?;
    let quiz_id = quiz::save_quiz(&state.pool, &ec, &body.quiz_data).await?;
    Ok(reply(SavedQuiz {
        success: true,
        quiz_id,
        message: format!(
            "Quiz enregistré avec {} question(s)",
            body.quiz_data.questions.len()
        ),
    }))
}

// ─────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EcHeader {
    pub name: String,
    pub title: String,
    pub price: i64,
    pub is_published: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EcStatsSummary {
    pub total_students: i64,
    pub validated: i64,
    pub in_progress: i64,
    pub validation_rate: f64,
    pub avg_quiz_score: f64,
    pub total_revenue: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MonthCount {
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentEnrollment {
    pub student: String,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub status: EnrollmentStatus,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct EcStats {
    pub ec: EcHeader,
    pub stats: EcStatsSummary,
    pub trends: Vec<MonthCount>,
    pub recent_enrollments: Vec<RecentEnrollment>,
}

pub async fn ec_stats(pool: &SqlitePool, ec: Ec, windows: &[Window]) -> Result<EcStats> {
    let rows: Vec<(EnrollmentStatus, f64, i64, i64)> = sqlx::query_as(
        "SELECT status, quiz_score, quiz_attempts, created_at FROM enrollments WHERE ec = ?1",
    )
    .bind(&ec.id)
    .fetch_all(pool)
    .await?;

    let total = rows.len() as i64;
    let validated = rows
        .iter()
        .filter(|(s, ..)| *s == EnrollmentStatus::Validated)
        .count() as i64;
    let in_progress = rows
        .iter()
        .filter(|(s, ..)| matches!(s, EnrollmentStatus::Paid | EnrollmentStatus::InProgress))
        .count() as i64;
    let scores: Vec<f64> = rows
        .iter()
        .filter(|(_, _, attempts, _)| *attempts > 0)
        .map(|(_, score, ..)| *score)
        .collect();
    let avg_quiz_score = if scores.is_empty() {
        0.0
    } else {
        round1(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    let total_revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE ec = ?1 AND status = 'Completed'",
    )
    .bind(&ec.id)
    .fetch_one(pool)
    .await?;

    let trends = windows
        .iter()
        .map(|w| MonthCount {
            month: w.label.clone(),
            count: rows.iter().filter(|(.., created)| w.contains(*created)).count() as i64,
        })
        .collect();

    let recent_enrollments = sqlx::query_as::<_, RecentEnrollment>(
        r#"
        SELECT e.student, s.full_name AS student_name, s.email AS student_email,
               e.status, e.created_at
        FROM   enrollments e
        LEFT JOIN students s ON s.id = e.student
        WHERE  e.ec = ?1
        ORDER  BY e.created_at DESC, e.id DESC
        LIMIT  10
        "#,
    )
    .bind(&ec.id)
    .fetch_all(pool)
    .await?;

    Ok(EcStats {
        ec: EcHeader {
            name: ec.id,
            title: ec.title,
            price: ec.price,
            is_published: ec.is_published,
        },
        stats: EcStatsSummary {
            total_students: total,
            validated,
            in_progress,
            validation_rate: percent1(validated, total),
            avg_quiz_score,
            total_revenue,
        },
        trends,
        recent_enrollments,
    })
}

/// `GET teacher.get_ec_stats`
pub async fn get_ec_stats(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<EcQuery>,
) -> ApiResult<EcStats> {
    session.require(AUTHORS)?;
    let ec = db::fetch_ec(&state.pool, &q.ec_id).await?;
    let windows = period::month_windows(period::today(), 6);
    Ok(reply(ec_stats(&state.pool, ec, &windows).await?))
}

#[derive(Debug, Deserialize)]
pub struct MediaBody {
    pub file_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Media {
    pub url: Option<String>,
}

/// `POST teacher.upload_media`
pub async fn upload_media(session: Session, Json(body): Json<MediaBody>) -> ApiResult<Media> {
    session.require(AUTHORS)?;
    Ok(reply(Media { url: body.file_url }))
}

/// Delete an EC with its lessons and quiz. Refused while students or
/// payments reference it.
pub async fn remove_ec(pool: &SqlitePool, ec: &Ec) -> Result<()> {
    let enrollments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE ec = ?1")
        .bind(&ec.id)
        .fetch_one(pool)
        .await?;
    if enrollments > 0 {
        return Err(AppError::validation(format!(
            "Impossible de supprimer: {enrollments} inscription(s) existante(s)"
        )));
    }
    let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE ec = ?1")
        .bind(&ec.id)
        .fetch_one(pool)
        .await?;
    if payments > 0 {
        return Err(AppError::validation(format!(
            "Impossible de supprimer: {payments} paiement(s) existant(s)"
        )));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lessons WHERE ec = ?1")
        .bind(&ec.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM quizzes WHERE ec = ?1")
        .bind(&ec.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM ecs WHERE id = ?1")
        .bind(&ec.id)
        .execute(&mut *tx)
        .await?;
    if let Some(course) = &ec.course {
        db::recompute_ec_count(&mut *tx, course).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// `POST teacher.delete_ec`
pub async fn delete_ec(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<EcQuery>,
) -> ApiResult<Done> {
    let user = session.require(AUTHORS)?;
    let ec = editable_ec(&state.pool, user, &body.ec_id).await?;
    remove_ec(&state.pool, &ec).await?;
    info!("EC {} deleted by {}", ec.id, user.email);
    Ok(reply(Done {
        success: true,
        message: "EC supprimé".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        pool, seed_catalog, seed_enrollment, seed_payment, seed_student, user_with_roles,
    };

    async fn ec_count(pool: &SqlitePool, course: &str) -> i64 {
        sqlx::query_scalar("SELECT ec_count FROM courses WHERE id = ?1")
            .bind(course)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn own_course(pool: &SqlitePool, user: &CurrentUser) -> String {
        save_course_draft(
            pool,
            user,
            &CourseDraft {
                course_id: None,
                title: Some("Licence 1 Gestion".into()),
                description: None,
                year: Some("L1".into()),
                image: None,
                center: None,
                is_published: Some(true),
            },
        )
        .await
        .unwrap()
        .name
    }

    #[tokio::test]
    async fn ec_count_follows_create_move_and_delete() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let teacher = user_with_roles("prof@cntemad.mg", &[Role::Instructor]);
        let course = own_course(&pool, &teacher).await;
        let other = own_course(&pool, &teacher).await;

        let saved = save_ec_draft(
            &pool,
            &teacher,
            &EcDraft {
                title: Some("Comptabilité".into()),
                course: Some(course.clone()),
                price: Some(45_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ec_count(&pool, &course).await, 1);

        save_ec_draft(
            &pool,
            &teacher,
            &EcDraft {
                ec_id: Some(saved.name.clone()),
                course: Some(other.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ec_count(&pool, &course).await, 0);
        assert_eq!(ec_count(&pool, &other).await, 1);
        let moved = db::fetch_ec(&pool, &saved.name).await.unwrap();
        assert_eq!(moved.title, "Comptabilité");
        assert_eq!(moved.price, 45_000);

        remove_ec(&pool, &moved).await.unwrap();
        assert_eq!(ec_count(&pool, &other).await, 0);
    }

    #[tokio::test]
    async fn ec_drafts_are_validated() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let teacher = user_with_roles("prof@cntemad.mg", &[Role::Instructor]);

        let no_title = save_ec_draft(&pool, &teacher, &EcDraft::default()).await;
        assert!(matches!(no_title.unwrap_err(), AppError::Validation(_)));

        let negative = EcDraft {
            title: Some("x".into()),
            price: Some(-1),
            ..Default::default()
        };
        assert!(save_ec_draft(&pool, &teacher, &negative).await.is_err());

        let foreign = EcDraft {
            title: Some("x".into()),
            course: Some("DROIT-L1".into()),
            ..Default::default()
        };
        assert!(matches!(
            save_ec_draft(&pool, &teacher, &foreign).await.unwrap_err(),
            AppError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn delete_is_refused_while_students_are_enrolled() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Paid").await;
        let ec = db::fetch_ec(&pool, "DROIT101").await.unwrap();
        let err = remove_ec(&pool, &ec).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Impossible de supprimer: 1 inscription(s) existante(s)"
        );

        let draft = db::fetch_ec(&pool, "DRAFT1").await.unwrap();
        remove_ec(&pool, &draft).await.unwrap();
        assert_eq!(ec_count(&pool, "DROIT-L1").await, 3);
    }

    #[tokio::test]
    async fn lessons_are_replaced_with_default_titles() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let ec = db::fetch_ec(&pool, "DROIT101").await.unwrap();
        replace_lessons(&pool, &ec, &[LessonDraft::default(), LessonDraft::default()])
            .await
            .unwrap();
        let count = replace_lessons(
            &pool,
            &ec,
            &[LessonDraft {
                video_url: Some("https://video".into()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();
        assert_eq!(count, 1);
        let lessons = lessons_of(&pool, "DROIT101").await.unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "Leçon 1");
        assert_eq!(lessons[0].idx, 1);
    }

    #[tokio::test]
    async fn stats_count_completed_revenue_only() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_student(&pool, "STU-0002", "autre@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Validated").await;
        seed_enrollment(&pool, "STU-0002", "DROIT101", "Paid").await;
        let now = db::now();
        seed_payment(&pool, "STU-0001", "DROIT101", "mvola", "Completed", 50_000, now).await;
        seed_payment(&pool, "STU-0002", "DROIT101", "mvola", "Failed", 50_000, now).await;

        let ec = db::fetch_ec(&pool, "DROIT101").await.unwrap();
        let windows = period::month_windows(period::today(), 6);
        let stats = ec_stats(&pool, ec, &windows).await.unwrap();
        assert_eq!(stats.stats.total_students, 2);
        assert_eq!(stats.stats.validated, 1);
        assert_eq!(stats.stats.in_progress, 1);
        assert_eq!(stats.stats.validation_rate, 50.0);
        assert_eq!(stats.stats.total_revenue, 50_000);
        assert_eq!(stats.trends.len(), 6);
        assert_eq!(stats.trends[5].count, 2);
        assert_eq!(stats.recent_enrollments.len(), 2);
    }
}
