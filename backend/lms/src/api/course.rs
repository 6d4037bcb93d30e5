//! `course.*` routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{non_empty, page, reply, ApiResult, ApiState};
use crate::auth::{self, Session};
use crate::db;
use crate::enrollment::percent1;
use crate::errors::Result;
use crate::models::{Course, EnrollmentStatus};

#[derive(Debug, Deserialize)]
pub struct CoursesQuery {
    pub center: Option<String>,
    pub year: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CourseCard {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub year: Option<String>,
    pub ec_count: i64,
    pub instructor: Option<String>,
}

/// `GET course.get_courses`
pub async fn get_courses(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<CoursesQuery>,
) -> ApiResult<Vec<CourseCard>> {
    let (limit, _) = page(q.limit, 20, None);
    let courses = sqlx::query_as::<_, CourseCard>(
        r#"
        SELECT id, title, description, image, year, ec_count, instructor
        FROM   courses
        WHERE  is_published = 1
          AND  (?1 IS NULL OR center = ?1)
          AND  (?2 IS NULL OR year = ?2)
        ORDER  BY title ASC, id ASC
        LIMIT  ?3
        "#,
    )
    .bind(non_empty(&q.center))
    .bind(non_empty(&q.year))
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;
    Ok(reply(courses))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CourseEc {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub duration_hours: i64,
    pub is_mandatory: bool,
    pub price: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EcEnrollment {
    #[serde(skip)]
    pub ec: String,
    pub status: EnrollmentStatus,
    pub quiz_score: f64,
    pub validation_date: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CourseProgress {
    pub total_ecs: i64,
    pub completed_ecs: i64,
    pub progress_percent: f64,
    pub ec_status: BTreeMap<String, EcEnrollment>,
}

#[derive(Debug, Serialize)]
pub struct CourseContent {
    pub course: Course,
    pub ecs: Vec<CourseEc>,
    pub user_progress: Option<CourseProgress>,
}

pub async fn course_progress(pool: &SqlitePool, student: &str, course: &str) -> Result<CourseProgress> {
    let enrollments = sqlx::query_as::<_, EcEnrollment>(
        r#"
        SELECT e.ec, e.status, e.quiz_score, e.validation_date
        FROM   enrollments e
        JOIN   ecs ec ON ec.id = e.ec
        WHERE  e.student = ?1 AND ec.course = ?2
        "#,
    )
    .bind(student)
    .bind(course)
    .fetch_all(pool)
    .await?;
    let total_ecs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ecs WHERE course = ?1")
        .bind(course)
        .fetch_one(pool)
        .await?;
    let completed_ecs = enrollments
        .iter()
        .filter(|e| e.status == EnrollmentStatus::Validated)
        .count() as i64;

    Ok(CourseProgress {
        total_ecs,
        completed_ecs,
        progress_percent: percent1(completed_ecs, total_ecs),
        ec_status: enrollments.into_iter().map(|e| (e.ec.clone(), e)).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    pub course_id: String,
}

/// `GET course.get_course_content`
pub async fn get_course_content(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<CourseQuery>,
) -> ApiResult<CourseContent> {
    let pool = &state.pool;
    let course = db::fetch_course(pool, &q.course_id).await?;
    let ecs = sqlx::query_as::<_, CourseEc>(
        r#"
        SELECT id, title, description, sort_order, duration_hours, is_mandatory, price
        FROM   ecs
        WHERE  course = ?1
        ORDER  BY sort_order ASC, id ASC
        "#,
    )
    .bind(&course.id)
    .fetch_all(pool)
    .await?;

    let user_progress = match auth::current_student(pool, &session).await? {
        Some(student) => Some(course_progress(pool, &student.id, &course.id).await?),
        None => None,
    };

    Ok(reply(CourseContent {
        course,
        ecs,
        user_progress,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pool, seed_catalog, seed_enrollment, seed_student};

    #[tokio::test]
    async fn progress_counts_every_ec_of_the_course() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Validated").await;
        seed_enrollment(&pool, "STU-0001", "DROIT102", "Paid").await;
        seed_enrollment(&pool, "STU-0001", "ECO201", "Validated").await;

        let progress = course_progress(&pool, "STU-0001", "DROIT-L1").await.unwrap();
        assert_eq!(progress.total_ecs, 4);
        assert_eq!(progress.completed_ecs, 1);
        assert_eq!(progress.progress_percent, 25.0);
        assert_eq!(progress.ec_status.len(), 2);
        assert_eq!(
            progress.ec_status["DROIT102"].status,
            EnrollmentStatus::Paid
        );
    }
}
