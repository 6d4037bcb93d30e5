//! `payment.*` routes: mobile money, bank transfers and provider callbacks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::{error, warn};

use super::{non_empty, page, reply, ApiResult, ApiState};
use crate::auth::{self, Session, PAYMENT_ADMINS};
use crate::errors::AppError;
use crate::models::{BankInfo, MobileProvider};
use crate::payments::{
    self, BankTransfer, InitiatedPayment, PaymentHistory, PaymentStatusView, PaymentUpdate,
    PendingBankPayments, WebhookAck,
};
use crate::webhooks::SIGNATURE_HEADER;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentBody {
    pub ec_id: String,
    pub provider: String,
    pub phone_number: String,
}

/// `POST payment.initiate_payment`
pub async fn initiate_payment(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<InitiatePaymentBody>,
) -> ApiResult<InitiatedPayment> {
    let student = auth::require_student(&state.pool, &session).await?;
    let started = payments::initiate_payment(
        &state,
        &student,
        &body.ec_id,
        &body.provider,
        &body.phone_number,
    )
    .await?;
    Ok(reply(started))
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub payment_id: String,
}

/// `GET payment.check_payment_status`
pub async fn check_payment_status(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PaymentQuery>,
) -> ApiResult<PaymentStatusView> {
    let user = session.user()?;
    let student = auth::current_student(&state.pool, &session).await?;
    let view =
        payments::check_payment_status(&state.pool, user, student.as_ref(), &q.payment_id).await?;
    Ok(reply(view))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET payment.get_payment_history`
pub async fn get_payment_history(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<PaymentHistory> {
    session.user()?;
    let student = auth::current_student(&state.pool, &session).await?;
    let (limit, offset) = page(q.limit, 20, q.offset);
    let history = payments::payment_history(&state.pool, student.as_ref(), limit, offset).await?;
    Ok(reply(history))
}

// ─────────────────────────────────────────────────────────
// Provider callbacks
// ─────────────────────────────────────────────────────────

async fn callback(
    state: &ApiState,
    provider: MobileProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiResult<WebhookAck> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match payments::handle_webhook(state, provider, signature, body).await {
        Ok(ack) => {
            if let Some(message) = &ack.message {
                warn!("{} callback not applied: {message}", provider.label());
            }
            Ok(reply(ack))
        }
        Err(e @ AppError::Unauthenticated(_)) => {
            warn!("{} callback rejected: {e}", provider.label());
            Err(e)
        }
        Err(e) => {
            error!("{} callback failed: {e}", provider.label());
            Ok(reply(WebhookAck::error("Webhook processing failed")))
        }
    }
}

/// `POST payment.mvola_callback`
pub async fn mvola_callback(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    callback(&state, MobileProvider::Mvola, &headers, &body).await
}

/// `POST payment.orange_callback`
pub async fn orange_callback(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    callback(&state, MobileProvider::OrangeMoney, &headers, &body).await
}

/// `POST payment.airtel_callback`
pub async fn airtel_callback(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    callback(&state, MobileProvider::AirtelMoney, &headers, &body).await
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub payment_id: String,
}

/// `POST payment.simulate_payment_success`
pub async fn simulate_payment_success(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<PaymentBody>,
) -> ApiResult<PaymentUpdate> {
    let student = auth::require_student(&state.pool, &session).await?;
    let done = payments::simulate_payment_success(&state, &student, &body.payment_id).await?;
    Ok(reply(done))
}

// ─────────────────────────────────────────────────────────
// Bank transfers
// ─────────────────────────────────────────────────────────

/// `GET payment.get_banks`
pub async fn get_banks() -> ApiResult<&'static [BankInfo]> {
    Ok(reply(payments::banks()))
}

#[derive(Debug, Deserialize)]
pub struct BankPaymentBody {
    pub ec_id: String,
    pub bank: String,
}

/// `POST payment.initiate_bank_payment`
pub async fn initiate_bank_payment(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<BankPaymentBody>,
) -> ApiResult<BankTransfer> {
    let student = auth::require_student(&state.pool, &session).await?;
    let transfer =
        payments::initiate_bank_payment(&state.pool, &student, &body.ec_id, &body.bank).await?;
    Ok(reply(transfer))
}

#[derive(Debug, Deserialize)]
pub struct BankProofBody {
    pub payment_id: String,
    pub proof_type: String,
    pub proof_value: String,
}

/// `POST payment.submit_bank_proof`
pub async fn submit_bank_proof(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<BankProofBody>,
) -> ApiResult<PaymentUpdate> {
    let student = auth::require_student(&state.pool, &session).await?;
    let update = payments::submit_bank_proof(
        &state.pool,
        &student,
        &body.payment_id,
        &body.proof_type,
        &body.proof_value,
    )
    .await?;
    Ok(reply(update))
}

#[derive(Debug, Deserialize)]
pub struct ValidateBankBody {
    pub payment_id: String,
    pub approved: bool,
    #[serde(default)]
    pub note: String,
}

/// `POST payment.validate_bank_payment`
pub async fn validate_bank_payment(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<ValidateBankBody>,
) -> ApiResult<PaymentUpdate> {
    let user = session.require(PAYMENT_ADMINS)?;
    let update = payments::validate_bank_payment(
        &state.pool,
        user,
        &body.payment_id,
        body.approved,
        &body.note,
    )
    .await?;
    Ok(reply(update))
}

#[derive(Debug, Deserialize)]
pub struct PendingBankQuery {
    pub center_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET payment.get_pending_bank_payments`
pub async fn get_pending_bank_payments(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<PendingBankQuery>,
) -> ApiResult<PendingBankPayments> {
    let user = session.require(PAYMENT_ADMINS)?;
    let (limit, offset) = page(q.limit, 50, q.offset);
    let pending =
        payments::pending_bank_payments(&state.pool, user, non_empty(&q.center_id), limit, offset)
            .await?;
    Ok(reply(pending))
}
