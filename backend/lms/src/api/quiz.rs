//! `quiz.*` routes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{reply, ApiResult, ApiState};
use crate::auth::{self, Session};
use crate::quiz::{self, QuizHistory, QuizResult, QuizView, SubmittedAnswer};

#[derive(Debug, Deserialize)]
pub struct QuizQuery {
    pub ec_id: String,
}

/// `GET quiz.get_quiz`
pub async fn get_quiz(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<QuizQuery>,
) -> ApiResult<QuizView> {
    session.user()?;
    let student = auth::current_student(&state.pool, &session).await?;
    Ok(reply(quiz::get_quiz(&state.pool, student.as_ref(), &q.ec_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizBody {
    pub ec_id: String,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    pub time_spent: Option<i64>,
}

/// `POST quiz.submit_quiz`
pub async fn submit_quiz(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<SubmitQuizBody>,
) -> ApiResult<QuizResult> {
    let student = auth::require_student(&state.pool, &session).await?;
    let result = quiz::submit_quiz(
        &state.pool,
        &student,
        &body.ec_id,
        &body.answers,
        body.time_spent,
    )
    .await?;
    Ok(reply(result))
}

/// `GET quiz.get_quiz_history`
pub async fn get_quiz_history(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<QuizQuery>,
) -> ApiResult<QuizHistory> {
    session.user()?;
    let student = auth::current_student(&state.pool, &session).await?;
    Ok(reply(quiz::quiz_history(&state.pool, student.as_ref(), &q.ec_id).await?))
}
