//! Fixed data behind the mentor and guardian dashboards. Nothing here is
//! persisted; writes are echoed back to the caller.

use serde::Serialize;

use crate::db;
use crate::enrollment::round1;
use crate::errors::{AppError, Result};
use crate::models::{normalize_phone, MobileProvider};

// ─────────────────────────────────────────────────────────
// Shared shapes
// ─────────────────────────────────────────────────────────

/// A student followed by a mentor or a guardian.
#[derive(Debug, Clone, Serialize)]
pub struct Learner {
    pub id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub phone: &'static str,
    pub year: &'static str,
    pub center: &'static str,
    pub progress: i64,
    pub validated_ecs: i64,
    pub total_ecs: i64,
    pub average: f64,
    pub last_activity: &'static str,
    pub days_inactive: i64,
    pub status: &'static str,
    pub enrolled_since: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcProgress {
    pub id: &'static str,
    pub title: &'static str,
    pub status: &'static str,
    pub grade: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub overall: i64,
    pub validated_ecs: i64,
    pub total_ecs: i64,
    pub average: f64,
    pub rank: i64,
    pub total_students: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthProgress {
    pub month: &'static str,
    pub progress: i64,
}

fn learner(
    id: &'static str,
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    year: &'static str,
    center: &'static str,
) -> Learner {
    Learner {
        id,
        name,
        email,
        phone,
        year,
        center,
        progress: 0,
        validated_ecs: 0,
        total_ecs: 12,
        average: 0.0,
        last_activity: "",
        days_inactive: 0,
        status: "active",
        enrolled_since: "2025-09-01",
    }
}

fn ec_progress(id: &'static str, title: &'static str, status: &'static str) -> EcProgress {
    EcProgress {
        id,
        title,
        status,
        grade: None,
        validated_at: None,
        progress: None,
        price: 75_000,
        paid: None,
    }
}

/// The five ECs of the sample L2 student, three of them validated.
pub fn sample_ecs() -> Vec<EcProgress> {
    vec![
        EcProgress {
            grade: Some(16),
            validated_at: Some("2026-01-15"),
            ..ec_progress("EC-001", "Algorithmique", "validated")
        },
        EcProgress {
            grade: Some(18),
            validated_at: Some("2026-01-10"),
            ..ec_progress("EC-002", "Programmation Python", "validated")
        },
        EcProgress {
            grade: Some(14),
            validated_at: Some("2026-01-05"),
            ..ec_progress("EC-003", "Base de données", "validated")
        },
        EcProgress {
            progress: Some(60),
            paid: Some(true),
            ..ec_progress("EC-004", "Réseaux", "in_progress")
        },
        EcProgress {
            progress: Some(0),
            paid: Some(false),
            ..ec_progress("EC-005", "Systèmes d'exploitation", "not_started")
        },
    ]
}

pub fn sample_progress() -> ProgressSummary {
    ProgressSummary {
        overall: 75,
        validated_ecs: 8,
        total_ecs: 12,
        average: 14.5,
        rank: 15,
        total_students: 120,
    }
}

pub fn progress_trend() -> Vec<MonthProgress> {
    [
        ("Août", 10),
        ("Sept", 25),
        ("Oct", 40),
        ("Nov", 55),
        ("Déc", 65),
        ("Jan", 75),
    ]
    .into_iter()
    .map(|(month, progress)| MonthProgress { month, progress })
    .collect()
}

fn required(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AppError::validation(message))
    } else {
        Ok(())
    }
}

pub fn require_student_id(student_id: &str) -> Result<()> {
    required(student_id, "ID étudiant requis")
}

// ─────────────────────────────────────────────────────────
// Mentor
// ─────────────────────────────────────────────────────────

pub fn mentees() -> Vec<Learner> {
    vec![
        Learner {
            progress: 75,
            validated_ecs: 8,
            average: 14.5,
            last_activity: "2026-01-20",
            days_inactive: 2,
            ..learner("STU-001", "Jean Rakoto", "jean.rakoto@email.mg", "034 12 345 67", "L2", "Antananarivo")
        },
        Learner {
            progress: 50,
            validated_ecs: 6,
            average: 11.2,
            last_activity: "2026-01-10",
            days_inactive: 12,
            status: "inactive",
            ..learner("STU-002", "Marie Rabe", "marie.rabe@email.mg", "032 98 765 43", "L2", "Antananarivo")
        },
        Learner {
            progress: 90,
            validated_ecs: 11,
            average: 16.8,
            last_activity: "2026-01-22",
            enrolled_since: "2024-09-01",
            ..learner("STU-003", "Paul Andria", "paul.andria@email.mg", "033 11 222 33", "L3", "Toamasina")
        },
        Learner {
            progress: 25,
            validated_ecs: 3,
            average: 9.5,
            last_activity: "2026-01-15",
            days_inactive: 7,
            status: "inactive",
            ..learner("STU-004", "Luc Razafy", "luc.razafy@email.mg", "034 55 666 77", "L1", "Fianarantsoa")
        },
    ]
}

/// Mentees matching `status` (`all` or absent keeps everyone) and `year`.
pub fn filter_mentees(status: Option<&str>, year: Option<&str>) -> Vec<Learner> {
    mentees()
        .into_iter()
        .filter(|m| status.map_or(true, |s| s == "all" || m.status == s))
        .filter(|m| year.map_or(true, |y| m.year == y))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct MentorAlert {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub student_id: &'static str,
    pub student_name: &'static str,
    pub message: &'static str,
    pub severity: &'static str,
    pub created_at: &'static str,
    pub status: &'static str,
}

pub fn mentor_alerts(status: Option<&str>) -> Vec<MentorAlert> {
    let alert = |id, kind, student_id, student_name, message, severity, created_at| MentorAlert {
        id,
        kind,
        student_id,
        student_name,
        message,
        severity,
        created_at,
        status: "active",
    };
    vec![
        alert("alert-1", "inactive", "STU-002", "Marie Rabe", "Inactive depuis 12 jours", "warning", "2026-01-20"),
        alert("alert-2", "low_progress", "STU-004", "Luc Razafy", "Progression faible (25%) en L1", "danger", "2026-01-19"),
        alert(
            "alert-3",
            "failed_quiz",
            "STU-005",
            "Sophie Ranaivo",
            "Échec au quiz Algorithmes (3ème tentative)",
            "warning",
            "2026-01-18",
        ),
    ]
    .into_iter()
    .filter(|a| status.map_or(true, |s| s == "all" || a.status == s))
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub who: &'static str,
    pub description: &'static str,
    pub timestamp: &'static str,
}

pub fn mentor_activity() -> Vec<FeedItem> {
    [
        ("ec_validated", "Paul Andria", "A validé l'EC Algorithmique", "2026-01-22 14:30"),
        ("message", "Jean Rakoto", "Nouveau message reçu", "2026-01-22 10:15"),
        ("quiz_passed", "Paul Andria", "Quiz réussi (18/20)", "2026-01-21 16:45"),
    ]
    .into_iter()
    .map(|(kind, who, description, timestamp)| FeedItem {
        kind,
        who,
        description,
        timestamp,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub student_id: &'static str,
    pub student_name: &'static str,
    pub last_message: &'static str,
    pub timestamp: &'static str,
    pub unread_count: i64,
}

pub fn conversations() -> Vec<Conversation> {
    [
        ("STU-001", "Jean Rakoto", "Je ne comprends pas bien la différence...", "2026-01-20 10:25", 1),
        ("STU-002", "Marie Rabe", "Merci pour votre aide !", "2026-01-18 15:30", 0),
        ("STU-003", "Paul Andria", "J'ai validé l'EC !", "2026-01-22 14:35", 2),
    ]
    .into_iter()
    .map(|(student_id, student_name, last_message, timestamp, unread_count)| Conversation {
        student_id,
        student_name,
        last_message,
        timestamp,
        unread_count,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub sender: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub content: String,
    pub timestamp: String,
    pub read: bool,
}

/// The sample thread with a mentee, oldest first, capped at `limit`.
pub fn thread(limit: usize) -> Vec<Message> {
    [
        ("msg-1", "mentor", "Bonjour Jean, comment avancez-vous sur l'EC Réseaux ?", "2026-01-20 10:00", true),
        (
            "msg-2",
            "student",
            "Bonjour ! J'ai terminé les 3 premières leçons. J'ai une question sur le chapitre TCP/IP.",
            "2026-01-20 10:15",
            true,
        ),
        ("msg-3", "mentor", "Très bien ! Quelle est votre question ?", "2026-01-20 10:20", true),
        (
            "msg-4",
            "student",
            "Je ne comprends pas bien la différence entre TCP et UDP. Pouvez-vous m'expliquer ?",
            "2026-01-20 10:25",
            false,
        ),
    ]
    .into_iter()
    .take(limit)
    .map(|(id, sender, content, timestamp, read)| Message {
        id: id.to_string(),
        sender,
        recipient: None,
        content: content.to_string(),
        timestamp: timestamp.to_string(),
        read,
    })
    .collect()
}

pub fn compose(student_id: &str, content: &str) -> Result<Message> {
    if student_id.trim().is_empty() || content.trim().is_empty() {
        return Err(AppError::validation("Étudiant et contenu requis"));
    }
    Ok(Message {
        id: db::new_id("msg").to_lowercase(),
        sender: "mentor",
        recipient: Some(student_id.trim().to_string()),
        content: content.trim().to_string(),
        timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        read: false,
    })
}

#[derive(Debug, Serialize)]
pub struct MentorStats {
    pub total_mentees: usize,
    pub active_mentees: usize,
    pub inactive_count: usize,
    pub messages_unread: i64,
    pub avg_progress: f64,
}

pub fn mentor_stats(mentees: &[Learner]) -> MentorStats {
    let active = mentees.iter().filter(|m| m.status == "active").count();
    MentorStats {
        total_mentees: mentees.len(),
        active_mentees: active,
        inactive_count: mentees.len() - active,
        messages_unread: conversations().iter().map(|c| c.unread_count).sum(),
        avg_progress: average_progress(mentees),
    }
}

fn average_progress(learners: &[Learner]) -> f64 {
    if learners.is_empty() {
        return 0.0;
    }
    let sum: i64 = learners.iter().map(|l| l.progress).sum();
    round1(sum as f64 / learners.len() as f64)
}

#[derive(Debug, Serialize)]
pub struct ActivityLine {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub date: &'static str,
}

pub fn mentee_history() -> Vec<ActivityLine> {
    [
        ("quiz", "Quiz Algorithmique réussi (16/20)", "2026-01-15"),
        ("lesson", "Leçon 5 de Réseaux complétée", "2026-01-14"),
        ("payment", "Paiement EC Réseaux confirmé", "2026-01-10"),
        ("login", "Dernière connexion", "2026-01-20"),
    ]
    .into_iter()
    .map(|(kind, description, date)| ActivityLine {
        kind,
        description,
        date,
    })
    .collect()
}

/// Look up one of `learners` by id.
pub fn find(learners: Vec<Learner>, id: &str, missing: &str) -> Result<Learner> {
    require_student_id(id)?;
    learners
        .into_iter()
        .find(|l| l.id == id.trim())
        .ok_or_else(|| AppError::not_found(missing))
}

#[derive(Debug, Serialize)]
pub struct LoginFrequency {
    pub last_7_days: i64,
    pub last_30_days: i64,
    pub average_session: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QuizPerformance {
    pub total_attempts: i64,
    pub passed: i64,
    pub failed: i64,
    pub average_score: f64,
}

#[derive(Debug, Serialize)]
pub struct EcCompletion {
    pub on_time: i64,
    pub late: i64,
    pub pending: i64,
}

#[derive(Debug, Serialize)]
pub struct MenteeStats {
    pub login_frequency: LoginFrequency,
    pub quiz_performance: QuizPerformance,
    pub ec_completion: EcCompletion,
    pub engagement_score: i64,
}

pub fn mentee_stats() -> MenteeStats {
    MenteeStats {
        login_frequency: LoginFrequency {
            last_7_days: 5,
            last_30_days: 18,
            average_session: "45 min",
        },
        quiz_performance: QuizPerformance {
            total_attempts: 12,
            passed: 10,
            failed: 2,
            average_score: 14.8,
        },
        ec_completion: EcCompletion {
            on_time: 6,
            late: 2,
            pending: 4,
        },
        engagement_score: 78,
    }
}

#[derive(Debug, Serialize)]
pub struct Dismissed {
    pub id: String,
    pub status: &'static str,
}

pub fn dismiss(alert_id: &str) -> Result<Dismissed> {
    required(alert_id, "ID alerte requis")?;
    Ok(Dismissed {
        id: alert_id.trim().to_string(),
        status: "resolved",
    })
}

// ─────────────────────────────────────────────────────────
// Guardian
// ─────────────────────────────────────────────────────────

pub fn children() -> Vec<Learner> {
    vec![
        Learner {
            progress: 75,
            validated_ecs: 8,
            average: 14.5,
            last_activity: "2026-01-20",
            days_inactive: 2,
            ..learner("STU-001", "Jean Rakoto", "jean.rakoto@email.mg", "034 12 345 67", "L2", "Antananarivo")
        },
        Learner {
            progress: 40,
            validated_ecs: 5,
            average: 12.0,
            last_activity: "2026-01-22",
            ..learner("STU-006", "Marie Rakoto", "marie.rakoto@email.mg", "032 98 765 43", "L1", "Antananarivo")
        },
    ]
}

pub fn guardian_activity() -> Vec<FeedItem> {
    [
        ("ec_validated", "Jean Rakoto", "A validé l'EC Algorithmique (16/20)", "2026-01-20 14:30"),
        ("payment", "Marie Rakoto", "Paiement EC Mathématiques confirmé", "2026-01-19 10:00"),
        ("quiz", "Jean Rakoto", "Quiz réussi Base de données (14/20)", "2026-01-18 16:45"),
    ]
    .into_iter()
    .map(|(kind, who, description, timestamp)| FeedItem {
        kind,
        who,
        description,
        timestamp,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub message: &'static str,
    pub child_name: &'static str,
    pub read: bool,
    pub created_at: &'static str,
}

pub fn notifications(unread_only: bool) -> Vec<Notification> {
    let n = |id, kind, title, message, child_name, read, created_at| Notification {
        id,
        kind,
        title,
        message,
        child_name,
        read,
        created_at,
    };
    vec![
        n(
            "notif-1",
            "success",
            "EC validé",
            "Jean a validé l'EC Algorithmique avec 16/20",
            "Jean Rakoto",
            false,
            "2026-01-20 14:30",
        ),
        n(
            "notif-2",
            "info",
            "Paiement confirmé",
            "Paiement de 75 000 Ar confirmé pour l'EC Réseaux",
            "Jean Rakoto",
            true,
            "2026-01-19 10:00",
        ),
        n(
            "notif-3",
            "warning",
            "Inactivité détectée",
            "Marie n'a pas été active depuis 5 jours",
            "Marie Rakoto",
            false,
            "2026-01-18 08:00",
        ),
        n(
            "notif-4",
            "success",
            "Quiz réussi",
            "Marie a réussi le quiz Mathématiques (13/20)",
            "Marie Rakoto",
            true,
            "2026-01-17 16:45",
        ),
    ]
    .into_iter()
    .filter(|n| !unread_only || !n.read)
    .collect()
}

#[derive(Debug, Serialize)]
pub struct NotificationRead {
    pub id: String,
    pub read: bool,
}

pub fn mark_read(notification_id: &str) -> Result<NotificationRead> {
    required(notification_id, "ID notification requis")?;
    Ok(NotificationRead {
        id: notification_id.trim().to_string(),
        read: true,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildPayment {
    pub id: &'static str,
    pub ec_title: &'static str,
    pub amount: i64,
    pub provider: &'static str,
    pub status: &'static str,
    pub paid_at: &'static str,
    pub transaction_ref: &'static str,
}

pub fn child_payments() -> Vec<ChildPayment> {
    [
        ("PAY-001", "Algorithmique", "mvola", "2025-10-15 10:30", "MVL123456"),
        ("PAY-002", "Programmation Python", "orange_money", "2025-10-20 14:00", "ORG789012"),
        ("PAY-003", "Base de données", "mvola", "2025-11-05 09:15", "MVL345678"),
        ("PAY-004", "Réseaux", "airtel_money", "2026-01-10 11:00", "AIR901234"),
    ]
    .into_iter()
    .map(|(id, ec_title, provider, paid_at, transaction_ref)| ChildPayment {
        id,
        ec_title,
        amount: 75_000,
        provider,
        status: "completed",
        paid_at,
        transaction_ref,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct UnpaidEc {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub price: i64,
    pub duration: &'static str,
    pub lessons: i64,
}

pub fn unpaid_ecs() -> Vec<UnpaidEc> {
    [
        ("EC-005", "Systèmes d'exploitation", "Introduction aux systèmes d'exploitation", "30 heures", 10),
        ("EC-006", "Développement Web", "HTML, CSS, JavaScript", "40 heures", 12),
        ("EC-007", "Gestion de projet", "Méthodes agiles et traditionnelles", "25 heures", 8),
    ]
    .into_iter()
    .map(|(id, title, description, duration, lessons)| UnpaidEc {
        id,
        title,
        description,
        price: 75_000,
        duration,
        lessons,
    })
    .collect()
}

#[derive(Debug, Serialize)]
pub struct GradeLine {
    pub ec: &'static str,
    pub grade: i64,
    pub date: &'static str,
}

pub fn grades_history() -> Vec<GradeLine> {
    sample_ecs()
        .into_iter()
        .filter_map(|ec| {
            Some(GradeLine {
                ec: ec.title,
                grade: ec.grade?,
                date: ec.validated_at?,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ChildTotal {
    pub child_name: &'static str,
    pub amount: i64,
    pub ecs_paid: i64,
}

#[derive(Debug, Serialize)]
pub struct ProviderTotal {
    pub provider: &'static str,
    pub amount: i64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentSummary {
    pub total_paid: i64,
    pub this_month: i64,
    pub this_year: i64,
    pub pending_payments: i64,
    pub pending_amount: i64,
    pub by_child: Vec<ChildTotal>,
    pub by_provider: Vec<ProviderTotal>,
}

pub fn payment_summary() -> PaymentSummary {
    PaymentSummary {
        total_paid: 450_000,
        this_month: 75_000,
        this_year: 300_000,
        pending_payments: 1,
        pending_amount: 75_000,
        by_child: vec![
            ChildTotal {
                child_name: "Jean Rakoto",
                amount: 300_000,
                ecs_paid: 4,
            },
            ChildTotal {
                child_name: "Marie Rakoto",
                amount: 150_000,
                ecs_paid: 2,
            },
        ],
        by_provider: [("mvola", 225_000, 3), ("orange_money", 150_000, 2), ("airtel_money", 75_000, 1)]
            .into_iter()
            .map(|(provider, amount, count)| ProviderTotal {
                provider,
                amount,
                count,
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct GuardianStats {
    pub total_children: usize,
    pub total_validated_ecs: i64,
    pub total_payments: i64,
    pub avg_progress: f64,
}

pub fn guardian_stats(children: &[Learner]) -> GuardianStats {
    GuardianStats {
        total_children: children.len(),
        total_validated_ecs: children.iter().map(|c| c.validated_ecs).sum(),
        total_payments: payment_summary().total_paid,
        avg_progress: average_progress(children),
    }
}

pub const CHILD_PAYMENT_AMOUNT: i64 = 75_000;

#[derive(Debug, Serialize)]
pub struct SimulatedPayment {
    pub id: String,
    pub student_id: String,
    pub ec_id: String,
    pub amount: i64,
    pub provider: &'static str,
    pub phone_number: String,
    pub status: &'static str,
    pub created_at: i64,
}

/// Validate a guardian's payment request the way a real initiation would,
/// without contacting the operator.
pub fn simulate_payment(
    student_id: &str,
    ec_id: &str,
    provider: &str,
    phone_number: &str,
) -> Result<SimulatedPayment> {
    if [student_id, ec_id, provider, phone_number]
        .iter()
        .any(|f| f.trim().is_empty())
    {
        return Err(AppError::validation("Tous les champs sont requis"));
    }
    let provider = MobileProvider::parse(provider.trim())
        .ok_or_else(|| AppError::validation(format!("Fournisseur invalide: {provider}")))?;
    let phone = normalize_phone(phone_number);
    if !provider.accepts(&phone) {
        return Err(AppError::validation(format!(
            "Numéro de téléphone invalide pour {}",
            provider.label()
        )));
    }
    Ok(SimulatedPayment {
        id: db::new_id("PAY"),
        student_id: student_id.trim().to_string(),
        ec_id: ec_id.trim().to_string(),
        amount: CHILD_PAYMENT_AMOUNT,
        provider: provider.code(),
        phone_number: phone,
        status: "pending",
        created_at: db::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentees_filter_by_status_and_year() {
        assert_eq!(filter_mentees(None, None).len(), 4);
        assert_eq!(filter_mentees(Some("all"), None).len(), 4);

        let inactive: Vec<_> = filter_mentees(Some("inactive"), None)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(inactive, ["STU-002", "STU-004"]);

        let l2_active: Vec<_> = filter_mentees(Some("active"), Some("L2"))
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(l2_active, ["STU-001"]);
    }

    #[test]
    fn mentor_stats_follow_the_mentee_list() {
        let stats = mentor_stats(&mentees());
        assert_eq!(stats.total_mentees, 4);
        assert_eq!(stats.active_mentees, 2);
        assert_eq!(stats.inactive_count, 2);
        assert_eq!(stats.messages_unread, 3);
        assert_eq!(stats.avg_progress, 60.0);
    }

    #[test]
    fn alerts_filter_by_status() {
        assert_eq!(mentor_alerts(Some("active")).len(), 3);
        assert_eq!(mentor_alerts(Some("resolved")).len(), 0);
        assert_eq!(mentor_alerts(None).len(), 3);
    }

    #[test]
    fn composing_requires_recipient_and_content() {
        let msg = compose("STU-001", "  Bon courage  ").unwrap();
        assert_eq!(msg.content, "Bon courage");
        assert_eq!(msg.recipient.as_deref(), Some("STU-001"));
        assert!(msg.id.starts_with("msg-"));
        assert!(!msg.read);

        assert!(compose("", "Salut").is_err());
        assert!(compose("STU-001", " ").is_err());
        assert_eq!(thread(2).len(), 2);
    }

    #[test]
    fn unknown_learners_are_not_found() {
        assert_eq!(find(children(), "STU-006", "x").unwrap().name, "Marie Rakoto");
        assert!(matches!(
            find(children(), "STU-404", "Enfant non trouvé"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            find(mentees(), " ", "x"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn unread_notifications_only() {
        let unread: Vec<_> = notifications(true).into_iter().map(|n| n.id).collect();
        assert_eq!(unread, ["notif-1", "notif-3"]);
        assert_eq!(notifications(false).len(), 4);
    }

    #[test]
    fn grades_come_from_validated_ecs() {
        let grades = grades_history();
        assert_eq!(grades.len(), 3);
        assert_eq!(grades[0].grade, 16);
    }

    #[test]
    fn simulated_payment_checks_operator_rules() {
        let p = simulate_payment("STU-001", "EC-005", "mvola", "034 12 345 67").unwrap();
        assert_eq!(p.amount, 75_000);
        assert_eq!(p.status, "pending");
        assert_eq!(p.phone_number, "0341234567");
        assert!(p.id.starts_with("PAY-"));

        let err = simulate_payment("STU-001", "EC-005", "mvola", "032 12 345 67").unwrap_err();
        assert_eq!(err.to_string(), "Numéro de téléphone invalide pour MVola");
        let err = simulate_payment("STU-001", "EC-005", "paypal", "0341234567").unwrap_err();
        assert_eq!(err.to_string(), "Fournisseur invalide: paypal");
        let err = simulate_payment("STU-001", "", "mvola", "0341234567").unwrap_err();
        assert_eq!(err.to_string(), "Tous les champs sont requis");
    }

    #[test]
    fn guardian_totals() {
        let stats = guardian_stats(&children());
        assert_eq!(stats.total_children, 2);
        assert_eq!(stats.total_validated_ecs, 13);
        assert_eq!(stats.total_payments, 450_000);
        assert_eq!(stats.avg_progress, 57.5);
        let summary = payment_summary();
        assert_eq!(
            summary.by_child.iter().map(|c| c.amount).sum::<i64>(),
            summary.total_paid
        );
    }
}
