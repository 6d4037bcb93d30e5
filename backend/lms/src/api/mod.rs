//! Axum HTTP API.
//!
//! Routes follow the RPC layout `/api/method/<module>.<operation>`: reads
//! are `GET` with query parameters, writes are `POST` with a JSON body.
//! Successful payloads are wrapped as `{"message": …}`.

pub mod center;
pub mod course;
pub mod ec;
pub mod evaluator;
pub mod guardian;
pub mod mentor;
pub mod national;
pub mod payment;
pub mod quiz;
pub mod student;
pub mod teacher;

use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::Result;
use crate::providers::Gateway;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub gateway: Gateway,
}

impl ApiState {
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let gateway = Gateway::from_config(config.clone())?;
        Ok(Self {
            pool,
            config,
            gateway,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

/// Successful RPC payload.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    pub message: T,
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn reply<T>(message: T) -> Reply<T> {
    Reply { message }
}

pub type ApiResult<T> = Result<Reply<T>>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `limit`/`offset` query values, clamped to sane bounds.
pub fn page(limit: Option<i64>, default: i64, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(default).clamp(1, 200),
        offset.unwrap_or(0).max(0),
    )
}

/// Empty strings from query forms count as absent.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn method(name: &str) -> String {
    format!("/api/method/{name}")
}

pub fn router(state: Arc<ApiState>) -> Router {
    let routes: Vec<(&str, axum::routing::MethodRouter<Arc<ApiState>>)> = vec![
        // payment
        ("payment.initiate_payment", post(payment::initiate_payment)),
        ("payment.check_payment_status", get(payment::check_payment_status)),
        ("payment.get_payment_history", get(payment::get_payment_history)),
        ("payment.mvola_callback", post(payment::mvola_callback)),
        ("payment.orange_callback", post(payment::orange_callback)),
        ("payment.airtel_callback", post(payment::airtel_callback)),
        ("payment.simulate_payment_success", post(payment::simulate_payment_success)),
        ("payment.get_banks", get(payment::get_banks)),
        ("payment.initiate_bank_payment", post(payment::initiate_bank_payment)),
        ("payment.submit_bank_proof", post(payment::submit_bank_proof)),
        ("payment.validate_bank_payment", post(payment::validate_bank_payment)),
        ("payment.get_pending_bank_payments", get(payment::get_pending_bank_payments)),
        // student
        ("student.get_student_progress", get(student::get_student_progress)),
        ("student.get_student_dashboard", get(student::get_student_dashboard)),
        ("student.create_student", post(student::create_student)),
        ("student.submit_assignment", post(student::submit_assignment)),
        // catalog
        ("ec.get_available_ecs", get(ec::get_available_ecs)),
        ("ec.get_ec_detail", get(ec::get_ec_detail)),
        ("ec.get_ec_content", get(ec::get_ec_content)),
        ("ec.update_lesson_progress", post(ec::update_lesson_progress)),
        ("ec.get_years", get(ec::get_years)),
        ("ec.get_courses_for_filter", get(ec::get_courses_for_filter)),
        ("course.get_courses", get(course::get_courses)),
        ("course.get_course_content", get(course::get_course_content)),
        // quiz
        ("quiz.get_quiz", get(quiz::get_quiz)),
        ("quiz.submit_quiz", post(quiz::submit_quiz)),
        ("quiz.get_quiz_history", get(quiz::get_quiz_history)),
        // teacher
        ("teacher.get_my_courses", get(teacher::get_my_courses)),
        ("teacher.get_course_ecs", get(teacher::get_course_ecs)),
        ("teacher.get_ec_for_edit", get(teacher::get_ec_for_edit)),
        ("teacher.save_course", post(teacher::save_course)),
        ("teacher.save_ec", post(teacher::save_ec)),
        ("teacher.save_ec_content", post(teacher::save_ec_content)),
        ("teacher.save_quiz", post(teacher::save_quiz)),
        ("teacher.get_ec_stats", get(teacher::get_ec_stats)),
        ("teacher.upload_media", post(teacher::upload_media)),
        ("teacher.delete_ec", post(teacher::delete_ec)),
        // evaluator
        ("evaluator.get_evaluator_dashboard", get(evaluator::get_evaluator_dashboard)),
        ("evaluator.get_pending_corrections", get(evaluator::get_pending_corrections)),
        ("evaluator.get_recent_corrections", get(evaluator::get_recent_corrections)),
        ("evaluator.get_submission_detail", get(evaluator::get_submission_detail)),
        ("evaluator.submit_grade", post(evaluator::submit_grade)),
        ("evaluator.get_pending_certificates", get(evaluator::get_pending_certificates)),
        ("evaluator.validate_certificate", post(evaluator::validate_certificate)),
        ("evaluator.get_grading_rubric", get(evaluator::get_grading_rubric)),
        // center
        ("center.get_my_center", get(center::get_my_center)),
        ("center.get_center_dashboard", get(center::get_center_dashboard)),
        ("center.get_center_students", get(center::get_center_students)),
        ("center.get_center_payments", get(center::get_center_payments)),
        ("center.get_center_stats", get(center::get_center_stats)),
        ("center.get_all_centers", get(center::get_all_centers)),
        ("center.export_students", get(center::export_students)),
        // national
        ("national.get_national_dashboard", get(national::get_national_dashboard)),
        ("national.get_all_centers", get(national::get_all_centers)),
        ("national.get_center_detail", get(national::get_center_detail)),
        ("national.compare_centers", post(national::compare_centers)),
        ("national.export_national_report", get(national::export_national_report)),
        ("national.get_centers_map_data", get(national::get_centers_map_data)),
        // mentor
        ("mentor.get_mentor_dashboard", get(mentor::get_mentor_dashboard)),
        ("mentor.get_my_mentees", get(mentor::get_my_mentees)),
        ("mentor.get_mentee_detail", get(mentor::get_mentee_detail)),
        ("mentor.get_messages", get(mentor::get_messages)),
        ("mentor.send_message", post(mentor::send_message)),
        ("mentor.get_alerts", get(mentor::get_alerts)),
        ("mentor.dismiss_alert", post(mentor::dismiss_alert)),
        ("mentor.get_mentee_stats", get(mentor::get_mentee_stats)),
        // guardian
        ("guardian.get_guardian_dashboard", get(guardian::get_guardian_dashboard)),
        ("guardian.get_my_children", get(guardian::get_my_children)),
        ("guardian.get_child_progress", get(guardian::get_child_progress)),
        ("guardian.get_child_payments", get(guardian::get_child_payments)),
        ("guardian.get_unpaid_ecs", get(guardian::get_unpaid_ecs)),
        ("guardian.initiate_payment_for_child", post(guardian::initiate_payment_for_child)),
        ("guardian.get_notifications", get(guardian::get_notifications)),
        ("guardian.mark_notification_read", post(guardian::mark_notification_read)),
        ("guardian.get_payment_summary", get(guardian::get_payment_summary)),
    ];

    let mut app = Router::new().route("/health", get(health));
    for (name, handler) in routes {
        app = app.route(&method(name), handler);
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page(None, 20, None), (20, 0));
        assert_eq!(page(Some(0), 20, Some(-5)), (1, 0));
        assert_eq!(page(Some(10_000), 20, Some(40)), (200, 40));
    }

    #[test]
    fn blank_query_values_are_absent() {
        assert_eq!(non_empty(&Some("  ".to_string())), None);
        assert_eq!(non_empty(&Some(" L1 ".to_string())), Some("L1"));
        assert_eq!(non_empty(&None), None);
    }

    #[test]
    fn replies_are_wrapped_in_message() {
        let body = serde_json::to_value(reply(vec![1, 2])).unwrap();
        assert_eq!(body, serde_json::json!({"message": [1, 2]}));
    }
}
