//! Domain records and the status vocabularies that drive the payment and
//! enrollment lifecycles.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Payment status
// ─────────────────────────────────────────────────────────

/// Lifecycle of a payment.
///
/// Mobile money: `Pending → Processing → Completed | Failed`.
/// Bank transfer: `Pending Transfer → Pending Validation → Completed | Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(rename = "Pending Transfer")]
    #[sqlx(rename = "Pending Transfer")]
    PendingTransfer,
    #[serde(rename = "Pending Validation")]
    #[sqlx(rename = "Pending Validation")]
    PendingValidation,
    Rejected,
}

impl PaymentStatus {
    /// Label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::PendingTransfer => "Pending Transfer",
            Self::PendingValidation => "Pending Validation",
            Self::Rejected => "Rejected",
        }
    }

    /// Lower snake-case form returned to clients.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PendingTransfer => "pending_transfer",
            Self::PendingValidation => "pending_validation",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        [
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::PendingTransfer,
            Self::PendingValidation,
            Self::Rejected,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(label) || s.slug() == label)
    }

    /// Statuses from which a payment may move into `self`.
    pub fn sources(self) -> &'static [PaymentStatus] {
        match self {
            Self::Pending | Self::PendingTransfer => &[],
            Self::Processing => &[Self::Pending],
            Self::Completed => &[Self::Pending, Self::Processing, Self::PendingValidation],
            Self::Failed => &[Self::Pending, Self::Processing],
            Self::PendingValidation => &[Self::PendingTransfer],
            Self::Rejected => &[Self::PendingValidation],
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        next.sources().contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }

    /// A mobile-money payment that has not settled yet.
    pub fn is_mobile_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// A bank transfer that has not settled yet.
    pub fn is_bank_in_flight(self) -> bool {
        matches!(self, Self::PendingTransfer | Self::PendingValidation)
    }

    /// SQL list of the source labels, for `WHERE status IN (…)` guards.
    pub fn sources_sql(self) -> String {
        self.sources()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ─────────────────────────────────────────────────────────
// Enrollment status
// ─────────────────────────────────────────────────────────

/// Progress of a student through one EC: `Paid → In Progress → Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum EnrollmentStatus {
    Paid,
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    Validated,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::InProgress => "In Progress",
            Self::Validated => "Validated",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::InProgress => "in_progress",
            Self::Validated => "validated",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Providers and banks
// ─────────────────────────────────────────────────────────

/// Mobile-money operators accepted for EC payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobileProvider {
    Mvola,
    OrangeMoney,
    AirtelMoney,
}

impl MobileProvider {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "mvola" => Some(Self::Mvola),
            "orange_money" => Some(Self::OrangeMoney),
            "airtel_money" => Some(Self::AirtelMoney),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Mvola => "mvola",
            Self::OrangeMoney => "orange_money",
            Self::AirtelMoney => "airtel_money",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mvola => "MVola",
            Self::OrangeMoney => "Orange Money",
            Self::AirtelMoney => "Airtel Money",
        }
    }

    /// Subscriber number prefixes allocated to the operator.
    pub fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Mvola => &["034", "038"],
            Self::OrangeMoney => &["032", "037"],
            Self::AirtelMoney => &["033"],
        }
    }

    /// Whether a normalised ten-digit number belongs to this operator.
    pub fn accepts(self, phone: &str) -> bool {
        phone.len() == 10
            && phone.bytes().all(|b| b.is_ascii_digit())
            && self.prefixes().iter().any(|p| phone.starts_with(p))
    }
}

/// Strip the separators people type into phone numbers.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BankInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub rib: &'static str,
    pub account_name: &'static str,
    pub swift: &'static str,
}

pub const BANKS: [BankInfo; 2] = [
    BankInfo {
        code: "bfv",
        name: "BFV-SG",
        rib: "00005 00001 01234567890 12",
        account_name: "CNTEMAD",
        swift: "BFVMMGMG",
    },
    BankInfo {
        code: "bni",
        name: "BNI Madagascar",
        rib: "00001 00002 01234567890 34",
        account_name: "CNTEMAD",
        swift: "BNIMMGMG",
    },
];

pub fn bank(code: &str) -> Option<&'static BankInfo> {
    BANKS.iter().find(|b| b.code == code)
}

/// Human label for a stored provider code (`mvola`, `bank_bfv`, …).
pub fn provider_label(code: &str) -> String {
    if let Some(p) = MobileProvider::parse(code) {
        return p.label().to_string();
    }
    match code.strip_prefix("bank_").and_then(bank) {
        Some(b) if b.code == "bfv" => "Virement BFV-SG".to_string(),
        Some(b) if b.code == "bni" => "Virement BNI".to_string(),
        _ => code.to_string(),
    }
}

/// Academic years offered, with their display labels.
pub const YEARS: [(&str, &str); 5] = [
    ("L1", "Licence 1"),
    ("L2", "Licence 2"),
    ("L3", "Licence 3"),
    ("M1", "Master 1"),
    ("M2", "Master 2"),
];

// ─────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub user: Option<String>,
    pub center: Option<String>,
    pub current_year: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Center {
    pub id: String,
    pub center_name: String,
    pub region: Option<String>,
    pub code: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub admin_user: Option<String>,
    pub admin_email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub year: Option<String>,
    pub center: Option<String>,
    pub instructor: Option<String>,
    pub owner: Option<String>,
    pub is_published: bool,
    pub ec_count: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Élément Constitutif: a paid, gradable unit of a course.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ec {
    pub id: String,
    pub code: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub course: Option<String>,
    pub year: Option<String>,
    pub price: i64,
    pub duration_hours: i64,
    pub image: Option<String>,
    pub content: Option<String>,
    pub is_published: bool,
    pub sort_order: i64,
    pub is_mandatory: bool,
    pub grading_rubric: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: String,
    pub ec: String,
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub content_type: Option<String>,
    pub idx: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: String,
    pub student: String,
    pub ec: String,
    pub status: EnrollmentStatus,
    pub payment: Option<String>,
    pub enrollment_date: i64,
    pub completed_lessons: String,
    pub quiz_score: f64,
    pub quiz_attempts: i64,
    pub validation_date: Option<i64>,
    pub final_grade: Option<f64>,
    pub evaluator_feedback: Option<String>,
    pub graded_by: Option<String>,
    pub graded_at: Option<i64>,
    pub needs_review: bool,
    pub created_at: i64,
    pub modified_at: i64,
}

impl Enrollment {
    /// Lesson ids marked complete. A corrupt column reads as empty.
    pub fn completed_lessons(&self) -> Vec<String> {
        serde_json::from_str(&self.completed_lessons).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: String,
    pub student: String,
    pub ec: String,
    pub center: Option<String>,
    pub amount: i64,
    pub provider: String,
    pub status: PaymentStatus,
    pub phone_last_4: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<i64>,
    pub bank_reference: Option<String>,
    pub bank_code: Option<String>,
    pub proof_type: Option<String>,
    pub proof_value: Option<String>,
    pub proof_submitted_at: Option<i64>,
    pub validated_by: Option<String>,
    pub validation_note: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
}

impl Payment {
    pub fn is_bank(&self) -> bool {
        self.provider.starts_with("bank_")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: String,
    pub student: String,
    pub ec: String,
    pub submission_type: String,
    pub file_url: Option<String>,
    pub content: Option<String>,
    pub status: String,
    pub assigned_evaluator: Option<String>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub graded_by: Option<String>,
    pub graded_at: Option<i64>,
    pub submission_date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: String,
    pub student: String,
    pub year: String,
    pub certificate_number: String,
    pub issued_by: Option<String>,
    pub issued_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_money_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn bank_transfer_transitions() {
        use PaymentStatus::*;
        assert!(PendingTransfer.can_transition_to(PendingValidation));
        assert!(PendingValidation.can_transition_to(Completed));
        assert!(PendingValidation.can_transition_to(Rejected));
        assert!(!PendingTransfer.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Completed));
    }

    #[test]
    fn payment_status_labels_round_trip() {
        assert_eq!(
            PaymentStatus::parse("Pending Validation"),
            Some(PaymentStatus::PendingValidation)
        );
        assert_eq!(
            PaymentStatus::parse("pending_transfer"),
            Some(PaymentStatus::PendingTransfer)
        );
        assert_eq!(PaymentStatus::parse("Success"), None);
        assert_eq!(
            PaymentStatus::Completed.sources_sql(),
            "'Pending', 'Processing', 'Pending Validation'"
        );
    }

    #[test]
    fn phone_numbers_are_checked_against_operator_prefixes() {
        let phone = normalize_phone("034 12-345.67");
        assert_eq!(phone, "0341234567");
        assert!(MobileProvider::Mvola.accepts(&phone));
        assert!(!MobileProvider::OrangeMoney.accepts(&phone));
        assert!(MobileProvider::AirtelMoney.accepts("0331234567"));
        assert!(!MobileProvider::AirtelMoney.accepts("033123456"));
        assert!(!MobileProvider::OrangeMoney.accepts("032123456x"));
    }

    #[test]
    fn provider_labels() {
        assert_eq!(provider_label("orange_money"), "Orange Money");
        assert_eq!(provider_label("bank_bfv"), "Virement BFV-SG");
        assert_eq!(provider_label("bank_bni"), "Virement BNI");
        assert_eq!(provider_label("cash"), "cash");
    }
}
