//! Outgoing mail. Messages are queued in `mail_outbox` for an external
//! relay; nothing here talks to a mail server.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::models::{provider_label, Payment};

/// Queue a message. Failures are logged and swallowed so that a broken
/// outbox never fails the operation that triggered the mail.
pub async fn queue_mail(pool: &SqlitePool, recipient: &str, subject: &str, body: &str) {
    if recipient.is_empty() {
        return;
    }
    let result = sqlx::query(
        "INSERT INTO mail_outbox (recipient, subject, body, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .bind(db::now())
    .execute(pool)
    .await;

    match result {
        Ok(_) => info!("Mail queued for {recipient}: {subject}"),
        Err(e) => warn!("Could not queue mail for {recipient}: {e}"),
    }
}

/// `75000` → `75,000 Ar`.
pub fn format_ariary(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped} Ar")
}

async fn student_contact(pool: &SqlitePool, student_id: &str) -> Option<(String, String)> {
    let row: Option<(Option<String>, String)> =
        sqlx::query_as("SELECT email, full_name FROM students WHERE id = ?1")
            .bind(student_id)
            .fetch_optional(pool)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not load contact of student {student_id}: {e}");
                None
            });
    match row {
        Some((Some(email), name)) if !email.is_empty() => Some((email, name)),
        _ => None,
    }
}

async fn ec_title(pool: &SqlitePool, ec_id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT title FROM ecs WHERE id = ?1")
        .bind(ec_id)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| ec_id.to_string())
}

pub async fn payment_confirmation(pool: &SqlitePool, payment: &Payment) {
    let Some((email, name)) = student_contact(pool, &payment.student).await else {
        return;
    };
    let title = ec_title(pool, &payment.ec).await;
    let body = format!(
        "Bonjour {name},\n\n\
         Votre paiement de {} pour l'EC \"{title}\" a été confirmé.\n\
         Moyen de paiement : {}\n\
         Référence : {}\n\n\
         Vous pouvez maintenant accéder au contenu du cours.\n\n\
         L'équipe CNTEMAD",
        format_ariary(payment.amount),
        provider_label(&payment.provider),
        payment
            .provider_transaction_id
            .as_deref()
            .or(payment.bank_reference.as_deref())
            .unwrap_or(&payment.id),
    );
    queue_mail(pool, &email, &format!("Paiement confirmé - {title}"), &body).await;
}

pub async fn payment_rejected(pool: &SqlitePool, payment: &Payment, note: &str) {
    let Some((email, name)) = student_contact(pool, &payment.student).await else {
        return;
    };
    let title = ec_title(pool, &payment.ec).await;
    let body = format!(
        "Bonjour {name},\n\n\
         Votre virement de {} pour l'EC \"{title}\" n'a pas pu être validé.\n\
         Motif : {note}\n\n\
         L'équipe CNTEMAD",
        format_ariary(payment.amount),
    );
    queue_mail(pool, &email, &format!("Paiement rejeté - {title}"), &body).await;
}

/// Tell the center administrator that a bank proof awaits validation.
pub async fn bank_proof_submitted(pool: &SqlitePool, payment: &Payment) {
    let Some(center) = payment.center.as_deref() else {
        return;
    };
    let admin_email: Option<String> =
        sqlx::query_scalar("SELECT admin_email FROM centers WHERE id = ?1")
            .bind(center)
            .fetch_optional(pool)
            .await
            .ok()
            .flatten()
            .flatten();
    let Some(admin_email) = admin_email else {
        return;
    };
    let student_name: String = sqlx::query_scalar("SELECT full_name FROM students WHERE id = ?1")
        .bind(&payment.student)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| payment.student.clone());
    let title = ec_title(pool, &payment.ec).await;
    let body = format!(
        "Un étudiant a soumis une preuve de virement bancaire.\n\n\
         Étudiant : {student_name}\n\
         EC : {title}\n\
         Montant : {}\n\
         Référence : {}\n\
         Preuve ({}) : {}\n\n\
         Veuillez valider ce paiement depuis votre tableau de bord.",
        format_ariary(payment.amount),
        payment.bank_reference.as_deref().unwrap_or_default(),
        payment.proof_type.as_deref().unwrap_or_default(),
        payment.proof_value.as_deref().unwrap_or_default(),
    );
    queue_mail(
        pool,
        &admin_email,
        &format!("Preuve de virement à valider - {student_name}"),
        &body,
    )
    .await;
}

pub async fn certificate_issued(pool: &SqlitePool, student_id: &str, year: &str, number: &str) {
    let Some((email, name)) = student_contact(pool, student_id).await else {
        return;
    };
    let body = format!(
        "Félicitations {name} !\n\n\
         Votre certificat pour l'année {year} a été validé.\n\
         Numéro de certificat : {number}\n\n\
         L'équipe CNTEMAD"
    );
    queue_mail(
        pool,
        &email,
        &format!("Félicitations ! Certificat {year} validé"),
        &body,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pool;

    #[test]
    fn ariary_grouping() {
        assert_eq!(format_ariary(0), "0 Ar");
        assert_eq!(format_ariary(950), "950 Ar");
        assert_eq!(format_ariary(75_000), "75,000 Ar");
        assert_eq!(format_ariary(1_250_000), "1,250,000 Ar");
        assert_eq!(format_ariary(-4_000), "-4,000 Ar");
    }

    #[tokio::test]
    async fn empty_recipient_is_skipped() {
        let pool = pool().await;
        queue_mail(&pool, "", "s", "b").await;
        queue_mail(&pool, "a@b.mg", "s", "b").await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mail_outbox")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
