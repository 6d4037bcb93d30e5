//! Payment lifecycle for EC purchases.
//!
//! Two paths lead to an enrollment:
//!
//! * mobile money: `Pending → Processing → Completed | Failed`, settled by
//!   the provider webhook;
//! * bank transfer: `Pending Transfer → Pending Validation → Completed |
//!   Rejected`, settled by a center administrator.
//!
//! Every status write is a conditional `UPDATE … WHERE status IN (…)`, so a
//! replayed or late callback can never move a settled payment. Completion
//! and enrollment activation share one transaction.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::api::ApiState;
use crate::auth::{self, CurrentUser, PAYMENT_ADMINS};
use crate::db;
use crate::enrollment;
use crate::errors::{is_unique_violation, AppError, Result};
use crate::models::{
    bank, normalize_phone, provider_label, BankInfo, Ec, MobileProvider, Payment, PaymentStatus,
    Student, BANKS,
};
use crate::notify;
use crate::providers::{Initiation, PushRequest};
use crate::webhooks::{self, Outcome};

const LIVE_STATUSES: &str =
    "'Pending', 'Processing', 'Pending Transfer', 'Pending Validation', 'Completed'";

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct InitiatedPayment {
    pub payment_id: String,
    pub status: &'static str,
    pub provider_ref: Option<String>,
    pub amount: i64,
    pub provider_label: String,
    pub message: String,
}

impl InitiatedPayment {
    fn existing(payment: &Payment, message: &str) -> Self {
        Self {
            payment_id: payment.id.clone(),
            status: payment.status.slug(),
            provider_ref: payment
                .provider_transaction_id
                .clone()
                .or_else(|| payment.bank_reference.clone()),
            amount: payment.amount,
            provider_label: provider_label(&payment.provider),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BankTransfer {
    pub payment_id: String,
    pub status: &'static str,
    pub reference: Option<String>,
    pub bank: Option<BankInfo>,
    pub amount: i64,
    pub ec_title: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BankTransferDetails {
    pub bank_reference: Option<String>,
    pub bank_code: Option<String>,
    pub bank: Option<BankInfo>,
    pub proof_type: Option<String>,
    pub proof_value: Option<String>,
    pub proof_submitted_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub payment_id: String,
    pub status: &'static str,
    pub amount: i64,
    pub provider: String,
    pub provider_label: String,
    pub ec: String,
    pub ec_title: Option<String>,
    pub completed_at: Option<i64>,
    pub failure_reason: Option<String>,
    pub is_bank_payment: bool,
    #[serde(flatten)]
    pub bank_transfer: Option<BankTransferDetails>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: String,
    pub ec: String,
    pub ec_title: Option<String>,
    pub amount: i64,
    pub provider: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub bank_reference: Option<String>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    #[sqlx(skip)]
    pub provider_label: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentHistory {
    pub payments: Vec<PaymentRow>,
    pub total: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PendingBankPayment {
    pub id: String,
    pub student: String,
    pub student_name: Option<String>,
    pub ec: String,
    pub ec_title: Option<String>,
    pub center: Option<String>,
    pub amount: i64,
    pub provider: String,
    pub bank_code: Option<String>,
    pub bank_reference: Option<String>,
    pub proof_type: Option<String>,
    pub proof_value: Option<String>,
    pub proof_submitted_at: Option<i64>,
    pub created_at: i64,
    #[sqlx(skip)]
    pub provider_label: String,
    #[sqlx(skip)]
    pub bank_name: String,
}

#[derive(Debug, Serialize)]
pub struct PendingBankPayments {
    pub payments: Vec<PendingBankPayment>,
    pub total: i64,
}

/// Outcome of a state-changing call on an existing payment.
#[derive(Debug, Serialize)]
pub struct PaymentUpdate {
    pub payment_id: String,
    pub status: &'static str,
    pub message: String,
}

/// Body returned to provider callbacks.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Status writes
// ─────────────────────────────────────────────────────────

async fn live_payment(pool: &SqlitePool, student: &str, ec: &str) -> Result<Option<Payment>> {
    let sql = format!(
        "SELECT * FROM payments WHERE student = ?1 AND ec = ?2 AND status IN ({LIVE_STATUSES}) \
         ORDER BY created_at DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(student)
        .bind(ec)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn mark_processing(pool: &SqlitePool, id: &str, transaction_id: Option<&str>) -> Result<bool> {
    let sql = format!(
        r#"
        UPDATE payments
        SET    status = 'Processing',
               provider_transaction_id = COALESCE(?2, provider_transaction_id),
               modified_at = ?3
        WHERE  id = ?1 AND status IN ({})
        "#,
        PaymentStatus::Processing.sources_sql()
    );
    let done = sqlx::query(&sql)
        .bind(id)
        .bind(transaction_id)
        .bind(db::now())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(done == 1)
}

async fn mark_failed(
    pool: &SqlitePool,
    id: &str,
    reason: &str,
    transaction_id: Option<&str>,
) -> Result<bool> {
    let sql = format!(
        r#"
        UPDATE payments
        SET    status = 'Failed',
               failure_reason = ?2,
               provider_transaction_id = COALESCE(?3, provider_transaction_id),
               modified_at = ?4
        WHERE  id = ?1 AND status IN ({})
        "#,
        PaymentStatus::Failed.sources_sql()
    );
    let done = sqlx::query(&sql)
        .bind(id)
        .bind(reason)
        .bind(transaction_id)
        .bind(db::now())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(done == 1)
}

/// Settle a payment and activate its enrollment atomically.
///
/// Returns `false` when the payment was no longer in a state that may
/// complete; nothing is written in that case.
async fn complete_payment(
    pool: &SqlitePool,
    payment: &Payment,
    transaction_id: Option<&str>,
    validated_by: Option<&str>,
    note: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let now = db::now();
    let sql = format!(
        r#"
        UPDATE payments
        SET    status = 'Completed',
               completed_at = ?2,
               provider_transaction_id = COALESCE(?3, provider_transaction_id),
               validated_by = COALESCE(?4, validated_by),
               validation_note = COALESCE(?5, validation_note),
               modified_at = ?2
        WHERE  id = ?1 AND status IN ({})
        "#,
        PaymentStatus::Completed.sources_sql()
    );
    let done = sqlx::query(&sql)
        .bind(&payment.id)
        .bind(now)
        .bind(transaction_id)
        .bind(validated_by)
        .bind(note)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if done != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    enrollment::activate_enrollment(&mut *tx, &payment.student, &payment.ec, &payment.id).await?;
    tx.commit().await?;
    info!(
        "Payment {} completed ({} Ar via {})",
        payment.id, payment.amount, payment.provider
    );
    Ok(true)
}

async fn insert_payment(pool: &SqlitePool, payment: &Payment) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO payments
            (id, student, ec, center, amount, provider, status, phone_last_4,
             bank_reference, bank_code, created_at, modified_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.student)
    .bind(&payment.ec)
    .bind(&payment.center)
    .bind(payment.amount)
    .bind(&payment.provider)
    .bind(payment.status)
    .bind(&payment.phone_last_4)
    .bind(&payment.bank_reference)
    .bind(&payment.bank_code)
    .bind(payment.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            info!(
                "Payment {} created: {} for EC {} ({})",
                payment.id,
                payment.status.as_str(),
                payment.ec,
                payment.provider
            );
            Ok(())
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(
            "Un paiement est déjà en cours pour cet EC".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

fn new_payment(student: &Student, ec: &Ec, provider: &str, status: PaymentStatus) -> Payment {
    let now = db::now();
    Payment {
        id: db::new_id("PAY"),
        student: student.id.clone(),
        ec: ec.id.clone(),
        center: student.center.clone(),
        amount: ec.price,
        provider: provider.to_string(),
        status,
        phone_last_4: None,
        provider_transaction_id: None,
        failure_reason: None,
        completed_at: None,
        bank_reference: None,
        bank_code: None,
        proof_type: None,
        proof_value: None,
        proof_submitted_at: None,
        validated_by: None,
        validation_note: None,
        created_at: now,
        modified_at: now,
    }
}

// ─────────────────────────────────────────────────────────
// Mobile money
// ─────────────────────────────────────────────────────────

/// Start a mobile-money payment for an EC.
pub async fn initiate_payment(
    state: &ApiState,
    student: &Student,
    ec_id: &str,
    provider: &str,
    phone_number: &str,
) -> Result<InitiatedPayment> {
    let provider = MobileProvider::parse(provider)
        .ok_or_else(|| AppError::validation(format!("Fournisseur invalide: {provider}")))?;
    let phone = normalize_phone(phone_number);
    if !provider.accepts(&phone) {
        return Err(AppError::validation(format!(
            "Numéro de téléphone invalide pour {}",
            provider.label()
        )));
    }

    let ec = db::fetch_ec(&state.pool, ec_id).await?;

    if let Some(existing) = live_payment(&state.pool, &student.id, &ec.id).await? {
        return match existing.status {
            PaymentStatus::Completed => Err(AppError::validation("Cet EC est déjà payé")),
            s if s.is_bank_in_flight() => Ok(InitiatedPayment::existing(
                &existing,
                "Un virement est déjà en cours pour cet EC",
            )),
            _ => Ok(InitiatedPayment::existing(
                &existing,
                "Un paiement est déjà en cours pour cet EC",
            )),
        };
    }

    if ec.price <= 0 {
        return Err(AppError::validation("Prix de l'EC non défini"));
    }

    let mut payment = new_payment(student, &ec, provider.code(), PaymentStatus::Pending);
    payment.phone_last_4 = Some(db::tail(&phone, 4));
    insert_payment(&state.pool, &payment).await?;

    let push = PushRequest {
        payment_id: &payment.id,
        amount: payment.amount,
        phone: &phone,
        ec_id: &ec.id,
    };
    match state.gateway.initiate(provider, &push).await {
        Initiation::Accepted { transaction_id } => {
            let status = if mark_processing(&state.pool, &payment.id, Some(&transaction_id)).await? {
                PaymentStatus::Processing
            } else {
                // The callback overtook the acknowledgement.
                db::fetch_payment(&state.pool, &payment.id).await?.status
            };
            Ok(InitiatedPayment {
                payment_id: payment.id,
                status: status.slug(),
                provider_ref: Some(transaction_id),
                amount: payment.amount,
                provider_label: provider.label().to_string(),
                message: "Paiement initié. Confirmez sur votre téléphone.".to_string(),
            })
        }
        Initiation::Declined { reason } => {
            mark_failed(&state.pool, &payment.id, &reason, None).await?;
            warn!("Payment {} failed at initiation: {reason}", payment.id);
            Err(AppError::validation(format!("Erreur provider: {reason}")))
        }
    }
}

/// Current state of a payment, for its owner or a payment administrator.
pub async fn check_payment_status(
    pool: &SqlitePool,
    user: &CurrentUser,
    student: Option<&Student>,
    payment_id: &str,
) -> Result<PaymentStatusView> {
    let payment = db::fetch_payment(pool, payment_id).await?;
    let is_owner = student.is_some_and(|s| s.id == payment.student);
    if !is_owner {
        if !user.has_any(PAYMENT_ADMINS) {
            return Err(AppError::forbidden("Accès non autorisé à ce paiement"));
        }
        auth::ensure_payment_admin(pool, user, payment.center.as_deref()).await?;
    }

    let ec_title: Option<String> = sqlx::query_scalar("SELECT title FROM ecs WHERE id = ?1")
        .bind(&payment.ec)
        .fetch_optional(pool)
        .await?;

    let is_bank = payment.is_bank();
    let bank_transfer = is_bank.then(|| BankTransferDetails {
        bank_reference: payment.bank_reference.clone(),
        bank_code: payment.bank_code.clone(),
        bank: payment.bank_code.as_deref().and_then(bank).cloned(),
        proof_type: payment.proof_type.clone(),
        proof_value: payment.proof_value.clone(),
        proof_submitted_at: payment.proof_submitted_at,
    });

    Ok(PaymentStatusView {
        status: payment.status.slug(),
        provider_label: provider_label(&payment.provider),
        payment_id: payment.id,
        amount: payment.amount,
        provider: payment.provider,
        ec: payment.ec,
        ec_title,
        completed_at: payment.completed_at,
        failure_reason: payment.failure_reason,
        is_bank_payment: is_bank,
        bank_transfer,
    })
}

/// A student's payments, newest first.
pub async fn payment_history(
    pool: &SqlitePool,
    student: Option<&Student>,
    limit: i64,
    offset: i64,
) -> Result<PaymentHistory> {
    let Some(student) = student else {
        return Ok(PaymentHistory {
            payments: Vec::new(),
            total: 0,
        });
    };

    let mut payments = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT p.id, p.ec, ec.title AS ec_title, p.amount, p.provider, p.status,
               p.failure_reason, p.bank_reference, p.completed_at, p.created_at
        FROM   payments p
        LEFT JOIN ecs ec ON ec.id = p.ec
        WHERE  p.student = ?1
        ORDER  BY p.created_at DESC, p.id DESC
        LIMIT  ?2 OFFSET ?3
        "#,
    )
    .bind(&student.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    for p in &mut payments {
        p.provider_label = provider_label(&p.provider);
    }

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE student = ?1")
        .bind(&student.id)
        .fetch_one(pool)
        .await?;

    Ok(PaymentHistory { payments, total })
}

/// Apply a provider callback.
///
/// Only a bad signature is an error; every other problem is logged and
/// acknowledged with an error body, since providers do not act on it.
pub async fn handle_webhook(
    state: &ApiState,
    provider: MobileProvider,
    signature: Option<&str>,
    body: &[u8],
) -> Result<WebhookAck> {
    let settings = state.gateway.settings(provider);
    if provider == MobileProvider::Mvola && !settings.sandbox {
        let valid = signature
            .is_some_and(|sig| webhooks::verify_signature(&settings.api_secret, body, sig));
        if !valid {
            warn!("Rejected {} callback with a bad signature", provider.label());
            return Err(AppError::Unauthenticated("Invalid signature".to_string()));
        }
    }

    let notice = webhooks::decode(provider, body);
    let Some(reference) = notice.reference.as_deref() else {
        warn!("{} callback without a payment reference", provider.label());
        return Ok(WebhookAck::error("Payment not found"));
    };

    let payment = match db::fetch_payment(&state.pool, reference).await {
        Ok(p) => p,
        Err(AppError::NotFound(_)) => {
            warn!("{} callback for unknown payment {reference}", provider.label());
            return Ok(WebhookAck::error("Payment not found"));
        }
        Err(e) => return Err(e),
    };
    if payment.provider != provider.code() {
        warn!(
            "{} callback for payment {} made with {}",
            provider.label(),
            payment.id,
            payment.provider
        );
        return Ok(WebhookAck::error("Payment not found"));
    }

    let tx_id = notice.transaction_id.as_deref();
    match notice.outcome {
        Outcome::Completed => {
            if payment.status == PaymentStatus::Completed {
                debug!("Replayed success callback for payment {}", payment.id);
            } else if complete_payment(&state.pool, &payment, tx_id, None, None).await? {
                let settled = db::fetch_payment(&state.pool, &payment.id).await?;
                notify::payment_confirmation(&state.pool, &settled).await;
            } else {
                warn!(
                    "Ignored success callback for payment {} in state {}",
                    payment.id,
                    payment.status.as_str()
                );
            }
        }
        Outcome::Failed { reason } => {
            if payment.status == PaymentStatus::Failed {
                debug!("Replayed failure callback for payment {}", payment.id);
            } else if mark_failed(&state.pool, &payment.id, &reason, tx_id).await? {
                info!("Payment {} failed: {reason}", payment.id);
            } else {
                warn!(
                    "Ignored failure callback for payment {} in state {}",
                    payment.id,
                    payment.status.as_str()
                );
            }
        }
        Outcome::Processing => {
            if payment.status != PaymentStatus::Processing
                && !mark_processing(&state.pool, &payment.id, tx_id).await?
            {
                debug!(
                    "Ignored processing callback for payment {} in state {}",
                    payment.id,
                    payment.status.as_str()
                );
            }
        }
        Outcome::Unrecognised(status) => {
            info!(
                "Unhandled {} status {status:?} for payment {}",
                provider.label(),
                payment.id
            );
        }
    }

    Ok(WebhookAck::ok())
}

/// Settle a mobile-money payment without a provider (sandbox only).
pub async fn simulate_payment_success(
    state: &ApiState,
    student: &Student,
    payment_id: &str,
) -> Result<PaymentUpdate> {
    if !state.config.mvola.sandbox {
        return Err(AppError::validation(
            "Simulation non disponible en production",
        ));
    }

    let payment = db::fetch_payment(&state.pool, payment_id).await?;
    if payment.student != student.id {
        return Err(AppError::forbidden("Accès non autorisé à ce paiement"));
    }
    if !payment.status.is_mobile_in_flight() {
        return Err(AppError::validation(format!(
            "Statut invalide pour la simulation: {}",
            payment.status.as_str()
        )));
    }

    if !complete_payment(&state.pool, &payment, None, None, None).await? {
        return Err(AppError::validation("Le paiement a changé d'état"));
    }
    let settled = db::fetch_payment(&state.pool, &payment.id).await?;
    notify::payment_confirmation(&state.pool, &settled).await;

    Ok(PaymentUpdate {
        payment_id: payment.id,
        status: PaymentStatus::Completed.slug(),
        message: "Paiement simulé avec succès".to_string(),
    })
}

// ─────────────────────────────────────────────────────────
// Bank transfer
// ─────────────────────────────────────────────────────────

pub fn banks() -> &'static [BankInfo] {
    &BANKS
}

/// Transfer reference a student writes on the bank order, such as
/// `CNT-DROIT101-0001-240315`.
pub fn bank_reference(ec: &Ec, student_id: &str, on: NaiveDate) -> String {
    let code = match ec.code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => code.to_string(),
        None => match ec.id.split_once('-') {
            Some((head, _)) => head.to_string(),
            None => ec.id.chars().take(8).collect(),
        },
    };
    format!(
        "CNT-{}-{}-{}",
        code.to_uppercase(),
        db::tail(student_id, 4),
        on.format("%y%m%d")
    )
}

/// Open a bank-transfer payment and hand out the transfer reference.
pub async fn initiate_bank_payment(
    pool: &SqlitePool,
    student: &Student,
    ec_id: &str,
    bank_code: &str,
) -> Result<BankTransfer> {
    let bank_info =
        bank(bank_code).ok_or_else(|| AppError::validation(format!("Banque invalide: {bank_code}")))?;
    let ec = db::fetch_ec(pool, ec_id).await?;

    if let Some(existing) = live_payment(pool, &student.id, &ec.id).await? {
        return match existing.status {
            PaymentStatus::Completed => Err(AppError::validation("Cet EC est déjà payé")),
            s if s.is_bank_in_flight() => Ok(BankTransfer {
                status: s.slug(),
                reference: existing.bank_reference.clone(),
                bank: existing.bank_code.as_deref().and_then(bank).cloned(),
                amount: existing.amount,
                ec_title: ec.title,
                message: "Un virement est déjà en cours pour cet EC".to_string(),
                payment_id: existing.id,
            }),
            s => Ok(BankTransfer {
                status: s.slug(),
                reference: None,
                bank: None,
                amount: existing.amount,
                ec_title: ec.title,
                message: "Un paiement mobile money est déjà en cours pour cet EC".to_string(),
                payment_id: existing.id,
            }),
        };
    }

    if ec.price <= 0 {
        return Err(AppError::validation("Prix de l'EC non défini"));
    }

    let reference = bank_reference(&ec, &student.id, chrono::Utc::now().date_naive());
    let mut payment = new_payment(
        student,
        &ec,
        &format!("bank_{}", bank_info.code),
        PaymentStatus::PendingTransfer,
    );
    payment.bank_reference = Some(reference.clone());
    payment.bank_code = Some(bank_info.code.to_string());
    insert_payment(pool, &payment).await?;

    Ok(BankTransfer {
        payment_id: payment.id,
        status: PaymentStatus::PendingTransfer.slug(),
        reference: Some(reference),
        bank: Some(bank_info.clone()),
        amount: payment.amount,
        ec_title: ec.title,
        message: "Effectuez le virement avec la référence indiquée, puis soumettez votre preuve de paiement."
            .to_string(),
    })
}

/// Attach the student's proof of transfer and queue it for validation.
pub async fn submit_bank_proof(
    pool: &SqlitePool,
    student: &Student,
    payment_id: &str,
    proof_type: &str,
    proof_value: &str,
) -> Result<PaymentUpdate> {
    let payment = db::fetch_payment(pool, payment_id).await?;
    if payment.student != student.id {
        return Err(AppError::forbidden("Accès non autorisé à ce paiement"));
    }
    if !payment.is_bank() || payment.status != PaymentStatus::PendingTransfer {
        return Err(AppError::validation(
            "Ce paiement n'est pas en attente de virement",
        ));
    }
    if !matches!(proof_type, "reference" | "receipt") {
        return Err(AppError::validation("Type de preuve invalide"));
    }
    let proof_value = proof_value.trim();
    if proof_value.chars().count() < 3 {
        return Err(AppError::validation(
            "Veuillez fournir une preuve de paiement valide",
        ));
    }

    let now = db::now();
    let sql = format!(
        r#"
        UPDATE payments
        SET    status = 'Pending Validation',
               proof_type = ?2,
               proof_value = ?3,
               proof_submitted_at = ?4,
               modified_at = ?4
        WHERE  id = ?1 AND status IN ({})
        "#,
        PaymentStatus::PendingValidation.sources_sql()
    );
    let done = sqlx::query(&sql)
        .bind(&payment.id)
        .bind(proof_type)
        .bind(proof_value)
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
    if done != 1 {
        return Err(AppError::validation(
            "Ce paiement n'est pas en attente de virement",
        ));
    }
    info!("Bank proof submitted for payment {}", payment.id);

    let updated = db::fetch_payment(pool, &payment.id).await?;
    notify::bank_proof_submitted(pool, &updated).await;

    Ok(PaymentUpdate {
        payment_id: payment.id,
        status: PaymentStatus::PendingValidation.slug(),
        message: "Preuve de paiement soumise. En attente de validation par l'administration."
            .to_string(),
    })
}

/// Approve or reject a transfer awaiting validation.
pub async fn validate_bank_payment(
    pool: &SqlitePool,
    user: &CurrentUser,
    payment_id: &str,
    approved: bool,
    note: &str,
) -> Result<PaymentUpdate> {
    let payment = db::fetch_payment(pool, payment_id).await?;
    auth::ensure_payment_admin(pool, user, payment.center.as_deref()).await?;

    if payment.status != PaymentStatus::PendingValidation {
        return Err(AppError::validation(
            "Ce paiement n'est pas en attente de validation",
        ));
    }
    let note = note.trim();

    if approved {
        let note = (!note.is_empty()).then_some(note);
        if !complete_payment(pool, &payment, None, Some(&user.email), note).await? {
            return Err(AppError::validation(
                "Ce paiement n'est pas en attente de validation",
            ));
        }
        let settled = db::fetch_payment(pool, &payment.id).await?;
        notify::payment_confirmation(pool, &settled).await;
        return Ok(PaymentUpdate {
            payment_id: payment.id,
            status: PaymentStatus::Completed.slug(),
            message: "Paiement validé avec succès".to_string(),
        });
    }

    if note.is_empty() {
        return Err(AppError::validation(
            "Veuillez indiquer le motif du rejet",
        ));
    }
    let sql = format!(
        r#"
        UPDATE payments
        SET    status = 'Rejected',
               failure_reason = ?2,
               validated_by = ?3,
               validation_note = ?2,
               modified_at = ?4
        WHERE  id = ?1 AND status IN ({})
        "#,
        PaymentStatus::Rejected.sources_sql()
    );
    let done = sqlx::query(&sql)
        .bind(&payment.id)
        .bind(note)
        .bind(&user.email)
        .bind(db::now())
        .execute(pool)
        .await?
        .rows_affected();
    if done != 1 {
        return Err(AppError::validation(
            "Ce paiement n'est pas en attente de validation",
        ));
    }
    info!("Bank payment {} rejected by {}", payment.id, user.email);
    notify::payment_rejected(pool, &payment, note).await;

    Ok(PaymentUpdate {
        payment_id: payment.id,
        status: PaymentStatus::Rejected.slug(),
        message: "Paiement rejeté".to_string(),
    })
}

/// Transfers with a submitted proof, newest proof first.
pub async fn pending_bank_payments(
    pool: &SqlitePool,
    user: &CurrentUser,
    center_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<PendingBankPayments> {
    let center = if user.is_national_admin() {
        center_id.filter(|c| !c.is_empty()).map(str::to_string)
    } else {
        Some(auth::resolve_center(pool, user, center_id).await?)
    };

    let mut payments = sqlx::query_as::<_, PendingBankPayment>(
        r#"
        SELECT p.id, p.student, s.full_name AS student_name, p.ec, ec.title AS ec_title,
               p.center, p.amount, p.provider, p.bank_code, p.bank_reference,
               p.proof_type, p.proof_value, p.proof_submitted_at, p.created_at
        FROM   payments p
        LEFT JOIN students s ON s.id = p.student
        LEFT JOIN ecs ec     ON ec.id = p.ec
        WHERE  p.status = 'Pending Validation'
          AND  p.provider LIKE 'bank_%'
          AND  (?1 IS NULL OR p.center = ?1)
        ORDER  BY p.proof_submitted_at DESC, p.id ASC
        LIMIT  ?2 OFFSET ?3
        "#,
    )
    .bind(&center)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    for p in &mut payments {
        p.provider_label = provider_label(&p.provider);
        p.bank_name = p
            .bank_code
            .as_deref()
            .and_then(bank)
            .map(|b| b.name.to_string())
            .unwrap_or_default();
    }

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM payments
        WHERE  status = 'Pending Validation'
          AND  provider LIKE 'bank_%'
          AND  (?1 IS NULL OR center = ?1)
        "#,
    )
    .bind(&center)
    .fetch_one(pool)
    .await?;

    Ok(PendingBankPayments { payments, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::EnrollmentStatus;
    use crate::test_support::{
        make_center_admin, pool, seed_catalog, seed_student, state, user_with_roles,
    };

    async fn setup() -> (ApiState, Student) {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        (state(pool), student)
    }

    async fn enrollment_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sandbox_initiation_moves_to_processing() {
        let (state, student) = setup().await;
        let started = initiate_payment(&state, &student, "DROIT101", "mvola", "034 12 345 67")
            .await
            .unwrap();
        assert_eq!(started.status, "processing");
        assert_eq!(started.amount, 50_000);
        assert_eq!(started.provider_label, "MVola");
        assert!(started.provider_ref.unwrap().starts_with("MVOLA-"));

        let payment = db::fetch_payment(&state.pool, &started.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.phone_last_4.as_deref(), Some("4567"));
        assert_eq!(payment.center.as_deref(), Some("CTR-TANA"));
    }

    #[tokio::test]
    async fn second_initiation_returns_the_payment_in_flight() {
        let (state, student) = setup().await;
        let first = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();
        let second = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();
        assert_eq!(first.payment_id, second.payment_id);
        assert_eq!(second.message, "Un paiement est déjà en cours pour cet EC");
    }

    #[tokio::test]
    async fn initiation_validates_provider_phone_and_price() {
        let (state, student) = setup().await;
        let err = initiate_payment(&state, &student, "DROIT101", "paypal", "0341234567")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = initiate_payment(&state, &student, "DROIT101", "orange_money", "0341234567")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Orange Money"));

        let err = initiate_payment(&state, &student, "NOPE", "mvola", "0341234567")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = initiate_payment(&state, &student, "FREE100", "mvola", "0341234567")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_records_a_failed_payment() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let mut config = crate::config::Config::local("sqlite::memory:");
        config.mvola.sandbox = false;
        config.mvola.api_url = "http://127.0.0.1:9".to_string();
        config.http_timeout_secs = 2;
        let state = ApiState::new(pool, config).unwrap();

        let err = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Erreur provider"));

        let (status, reason): (PaymentStatus, Option<String>) =
            sqlx::query_as("SELECT status, failure_reason FROM payments")
                .fetch_one(&state.pool)
                .await
                .unwrap();
        assert_eq!(status, PaymentStatus::Failed);
        assert!(reason.is_some());

        // A failed attempt does not block a new one.
        assert!(live_payment(&state.pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn replayed_success_webhook_enrolls_once() {
        let (state, student) = setup().await;
        let started = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();
        let body = format!(
            r#"{{"serverCorrelationId":"MV-1","requestingOrganisationTransactionReference":"{}","status":"completed"}}"#,
            started.payment_id
        );

        for _ in 0..2 {
            let ack = handle_webhook(&state, MobileProvider::Mvola, None, body.as_bytes())
                .await
                .unwrap();
            assert_eq!(ack, WebhookAck::ok());
        }

        let payment = db::fetch_payment(&state.pool, &started.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.provider_transaction_id.as_deref(), Some("MV-1"));
        assert!(payment.completed_at.is_some());
        assert_eq!(enrollment_count(&state.pool).await, 1);

        let enrollment = enrollment::find_enrollment(&state.pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Paid);
        assert_eq!(enrollment.payment.as_deref(), Some(started.payment_id.as_str()));

        let mails: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mail_outbox")
            .fetch_one(&state.pool)
            .await
            .unwrap();
        assert_eq!(mails, 1);
    }

    #[tokio::test]
    async fn late_failure_does_not_undo_completion() {
        let (state, student) = setup().await;
        let started = initiate_payment(&state, &student, "DROIT101", "airtel_money", "0331234567")
            .await
            .unwrap();
        let ok = format!(r#"{{"reference":"{}","status":"successful"}}"#, started.payment_id);
        let ko = format!(r#"{{"reference":"{}","status":"failed"}}"#, started.payment_id);
        handle_webhook(&state, MobileProvider::AirtelMoney, None, ok.as_bytes())
            .await
            .unwrap();
        handle_webhook(&state, MobileProvider::AirtelMoney, None, ko.as_bytes())
            .await
            .unwrap();

        let payment = db::fetch_payment(&state.pool, &started.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.failure_reason, None);
    }

    #[tokio::test]
    async fn failure_webhook_records_reason_and_enrolls_nobody() {
        let (state, student) = setup().await;
        let started = initiate_payment(&state, &student, "DROIT101", "orange_money", "0321234567")
            .await
            .unwrap();
        let body = format!(
            r#"{{"orderId":"{}","status":"cancelled","message":"Solde insuffisant"}}"#,
            started.payment_id
        );
        handle_webhook(&state, MobileProvider::OrangeMoney, None, body.as_bytes())
            .await
            .unwrap();

        let payment = db::fetch_payment(&state.pool, &started.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("Solde insuffisant"));
        assert_eq!(enrollment_count(&state.pool).await, 0);
    }

    #[tokio::test]
    async fn webhook_for_unknown_or_foreign_payment_is_reported() {
        let (state, student) = setup().await;
        let ack = handle_webhook(
            &state,
            MobileProvider::Mvola,
            None,
            br#"{"requestingOrganisationTransactionReference":"PAY-NOPE","status":"completed"}"#,
        )
        .await
        .unwrap();
        assert_eq!(ack, WebhookAck::error("Payment not found"));

        let started = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();
        let body = format!(r#"{{"orderId":"{}","status":"success"}}"#, started.payment_id);
        let ack = handle_webhook(&state, MobileProvider::OrangeMoney, None, body.as_bytes())
            .await
            .unwrap();
        assert_eq!(ack.status, "error");
        assert_eq!(enrollment_count(&state.pool).await, 0);
    }

    #[tokio::test]
    async fn live_mvola_webhook_requires_signature() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let mut config = crate::config::Config::local("sqlite::memory:");
        config.mvola.sandbox = false;
        config.mvola.api_secret = "hook-secret".to_string();
        let state = ApiState::new(pool, config).unwrap();
        let body = br#"{"requestingOrganisationTransactionReference":"PAY-X","status":"completed"}"#;

        let err = handle_webhook(&state, MobileProvider::Mvola, Some("deadbeef"), body)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));

        let signature = webhooks::sign("hook-secret", body);
        let ack = handle_webhook(&state, MobileProvider::Mvola, Some(&signature), body)
            .await
            .unwrap();
        assert_eq!(ack, WebhookAck::error("Payment not found"));
    }

    #[tokio::test]
    async fn simulation_completes_own_payment_only() {
        let (state, student) = setup().await;
        let other = seed_student(&state.pool, "STU-0002", "autre@cntemad.mg", "CTR-TANA").await;
        let started = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();

        let err = simulate_payment_success(&state, &other, &started.payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let done = simulate_payment_success(&state, &student, &started.payment_id)
            .await
            .unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(enrollment_count(&state.pool).await, 1);

        let err = simulate_payment_success(&state, &student, &started.payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cet EC est déjà payé");
    }

    #[test]
    fn bank_reference_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut ec = crate::test_support::ec("DROIT101-2024", 50_000);
        assert_eq!(
            bank_reference(&ec, "STU-000123", date),
            "CNT-DROIT101-0123-240315"
        );
        ec.id = "economie".to_string();
        assert_eq!(bank_reference(&ec, "S1", date), "CNT-ECONOMIE-S1-240315");
        ec.code = Some("eco2".to_string());
        assert_eq!(bank_reference(&ec, "S1", date), "CNT-ECO2-S1-240315");
    }

    #[tokio::test]
    async fn bank_transfer_approval_flow() {
        let (state, student) = setup().await;
        let admin = make_center_admin(&state.pool, "CTR-TANA", "admin@tana.mg").await;

        let transfer = initiate_bank_payment(&state.pool, &student, "DROIT101", "bfv")
            .await
            .unwrap();
        assert_eq!(transfer.status, "pending_transfer");
        assert!(transfer.reference.as_deref().unwrap().starts_with("CNT-DROIT101-0001-"));
        assert_eq!(transfer.bank.as_ref().unwrap().name, "BFV-SG");

        // Validation is refused before a proof exists.
        let err = validate_bank_payment(&state.pool, &admin, &transfer.payment_id, true, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = submit_bank_proof(&state.pool, &student, &transfer.payment_id, "photo", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = submit_bank_proof(&state.pool, &student, &transfer.payment_id, "reference", " a ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        submit_bank_proof(&state.pool, &student, &transfer.payment_id, "reference", "VIR-778812")
            .await
            .unwrap();
        let pending = pending_bank_payments(&state.pool, &admin, None, 50, 0)
            .await
            .unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.payments[0].bank_name, "BFV-SG");
        assert_eq!(pending.payments[0].student_name.as_deref(), Some("Rakoto Jean"));

        let done = validate_bank_payment(&state.pool, &admin, &transfer.payment_id, true, "")
            .await
            .unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(enrollment_count(&state.pool).await, 1);

        let payment = db::fetch_payment(&state.pool, &transfer.payment_id).await.unwrap();
        assert_eq!(payment.validated_by.as_deref(), Some("admin@tana.mg"));
    }

    #[tokio::test]
    async fn bank_rejection_requires_a_note() {
        let (state, student) = setup().await;
        let admin = user_with_roles("root@cntemad.mg", &[Role::NationalAdmin]);
        let transfer = initiate_bank_payment(&state.pool, &student, "DROIT101", "bni")
            .await
            .unwrap();
        submit_bank_proof(&state.pool, &student, &transfer.payment_id, "receipt", "recu.pdf")
            .await
            .unwrap();

        let err = validate_bank_payment(&state.pool, &admin, &transfer.payment_id, false, "  ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Veuillez indiquer le motif du rejet");

        let done = validate_bank_payment(
            &state.pool,
            &admin,
            &transfer.payment_id,
            false,
            "Montant incorrect",
        )
        .await
        .unwrap();
        assert_eq!(done.status, "rejected");
        let payment = db::fetch_payment(&state.pool, &transfer.payment_id).await.unwrap();
        assert_eq!(payment.failure_reason.as_deref(), Some("Montant incorrect"));
        assert_eq!(enrollment_count(&state.pool).await, 0);

        // A rejected transfer frees the EC for a new attempt.
        let again = initiate_bank_payment(&state.pool, &student, "DROIT101", "bni")
            .await
            .unwrap();
        assert_ne!(again.payment_id, transfer.payment_id);
    }

    #[tokio::test]
    async fn other_center_admin_cannot_validate() {
        let (state, student) = setup().await;
        crate::test_support::seed_center(&state.pool, "CTR-TAMATAVE", None).await;
        let stranger = make_center_admin(&state.pool, "CTR-TAMATAVE", "admin@tamatave.mg").await;
        let transfer = initiate_bank_payment(&state.pool, &student, "DROIT101", "bfv")
            .await
            .unwrap();
        submit_bank_proof(&state.pool, &student, &transfer.payment_id, "reference", "VIR-1")
            .await
            .unwrap();

        let err = validate_bank_payment(&state.pool, &stranger, &transfer.payment_id, true, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let pending = pending_bank_payments(&state.pool, &stranger, None, 50, 0)
            .await
            .unwrap();
        assert_eq!(pending.total, 0);
    }

    #[tokio::test]
    async fn mobile_and_bank_paths_block_each_other() {
        let (state, student) = setup().await;
        let transfer = initiate_bank_payment(&state.pool, &student, "DROIT101", "bfv")
            .await
            .unwrap();
        let mobile = initiate_payment(&state, &student, "DROIT101", "mvola", "0341234567")
            .await
            .unwrap();
        assert_eq!(mobile.payment_id, transfer.payment_id);
        assert_eq!(mobile.message, "Un virement est déjà en cours pour cet EC");

        let started = initiate_payment(&state, &student, "DROIT102", "mvola", "0341234567")
            .await
            .unwrap();
        let bank = initiate_bank_payment(&state.pool, &student, "DROIT102", "bni")
            .await
            .unwrap();
        assert_eq!(bank.payment_id, started.payment_id);
        assert!(bank.reference.is_none());
    }

    #[tokio::test]
    async fn status_check_is_limited_to_owner_and_admins() {
        let (state, student) = setup().await;
        let started = initiate_bank_payment(&state.pool, &student, "DROIT101", "bfv")
            .await
            .unwrap();
        let owner = user_with_roles("etudiant@cntemad.mg", &[Role::Student]);
        let view = check_payment_status(&state.pool, &owner, Some(&student), &started.payment_id)
            .await
            .unwrap();
        assert_eq!(view.status, "pending_transfer");
        assert!(view.is_bank_payment);
        assert_eq!(
            view.bank_transfer.as_ref().unwrap().bank_code.as_deref(),
            Some("bfv")
        );

        let other = seed_student(&state.pool, "STU-0002", "autre@cntemad.mg", "CTR-TANA").await;
        let intruder = user_with_roles("autre@cntemad.mg", &[Role::Student]);
        let err = check_payment_status(&state.pool, &intruder, Some(&other), &started.payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let history = payment_history(&state.pool, Some(&student), 20, 0).await.unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.payments[0].provider_label, "Virement BFV-SG");
        let empty = payment_history(&state.pool, None, 20, 0).await.unwrap();
        assert_eq!(empty.total, 0);
    }
}
