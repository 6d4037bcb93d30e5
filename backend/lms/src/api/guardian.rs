//! `guardian.*` routes over simulated data for a parent's children.

use axum::{extract::Query, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{reply, ApiResult};
use crate::auth::{Role, Session};
use crate::mock::{
    self, ChildPayment, EcProgress, FeedItem, GradeLine, GuardianStats, Learner, MonthProgress,
    Notification, NotificationRead, PaymentSummary, ProgressSummary, SimulatedPayment, UnpaidEc,
};

const GUARDIANS: &[Role] = &[Role::Guardian];

#[derive(Debug, Serialize)]
pub struct GuardianProfile {
    pub user: String,
    pub full_name: String,
    pub email: String,
    pub phone: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GuardianDashboard {
    pub guardian: GuardianProfile,
    pub children: Vec<Learner>,
    pub stats: GuardianStats,
    pub recent_activity: Vec<FeedItem>,
    pub notifications: Vec<Notification>,
}

/// `GET guardian.get_guardian_dashboard`
pub async fn get_guardian_dashboard(session: Session) -> ApiResult<GuardianDashboard> {
    let user = session.require(GUARDIANS)?;
    let children = mock::children();
    Ok(reply(GuardianDashboard {
        guardian: GuardianProfile {
            user: user.email.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            phone: "034 12 345 67",
        },
        stats: mock::guardian_stats(&children),
        children,
        recent_activity: mock::guardian_activity(),
        notifications: mock::notifications(false).into_iter().take(2).collect(),
    }))
}

/// `GET guardian.get_my_children`
pub async fn get_my_children(session: Session) -> ApiResult<Vec<Learner>> {
    session.require(GUARDIANS)?;
    Ok(reply(mock::children()))
}

#[derive(Debug, Deserialize)]
pub struct ChildQuery {
    #[serde(default)]
    pub student_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChildProgress {
    pub student: Learner,
    pub progress: ProgressSummary,
    pub ecs: Vec<EcProgress>,
    pub trend: Vec<MonthProgress>,
    pub grades_history: Vec<GradeLine>,
}

fn child(student_id: &str) -> crate::errors::Result<Learner> {
    mock::find(mock::children(), student_id, "Enfant non trouvé")
}

/// `GET guardian.get_child_progress`
pub async fn get_child_progress(
    session: Session,
    Query(q): Query<ChildQuery>,
) -> ApiResult<ChildProgress> {
    session.require(GUARDIANS)?;
    Ok(reply(ChildProgress {
        student: child(&q.student_id)?,
        progress: mock::sample_progress(),
        ecs: mock::sample_ecs(),
        trend: mock::progress_trend(),
        grades_history: mock::grades_history(),
    }))
}

/// `GET guardian.get_child_payments`
pub async fn get_child_payments(
    session: Session,
    Query(q): Query<ChildQuery>,
) -> ApiResult<Vec<ChildPayment>> {
    session.require(GUARDIANS)?;
    child(&q.student_id)?;
    Ok(reply(mock::child_payments()))
}

/// `GET guardian.get_unpaid_ecs`
pub async fn get_unpaid_ecs(
    session: Session,
    Query(q): Query<ChildQuery>,
) -> ApiResult<Vec<UnpaidEc>> {
    session.require(GUARDIANS)?;
    child(&q.student_id)?;
    Ok(reply(mock::unpaid_ecs()))
}

#[derive(Debug, Deserialize)]
pub struct ChildPaymentBody {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub ec_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub phone_number: String,
}

/// `POST guardian.initiate_payment_for_child`
pub async fn initiate_payment_for_child(
    session: Session,
    Json(body): Json<ChildPaymentBody>,
) -> ApiResult<SimulatedPayment> {
    let user = session.require(GUARDIANS)?;
    let payment = mock::simulate_payment(
        &body.student_id,
        &body.ec_id,
        &body.provider,
        &body.phone_number,
    )?;
    info!(
        "Simulated {} payment {} for {} by {}",
        payment.provider, payment.id, payment.student_id, user.email
    );
    Ok(reply(payment))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// `GET guardian.get_notifications`
pub async fn get_notifications(
    session: Session,
    Query(q): Query<NotificationsQuery>,
) -> ApiResult<Vec<Notification>> {
    session.require(GUARDIANS)?;
    Ok(reply(mock::notifications(q.unread_only)))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadBody {
    #[serde(default)]
    pub notification_id: String,
}

/// `POST guardian.mark_notification_read`
pub async fn mark_notification_read(
    session: Session,
    Json(body): Json<MarkReadBody>,
) -> ApiResult<NotificationRead> {
    session.require(GUARDIANS)?;
    Ok(reply(mock::mark_read(&body.notification_id)?))
}

/// `GET guardian.get_payment_summary`
pub async fn get_payment_summary(session: Session) -> ApiResult<PaymentSummary> {
    session.require(GUARDIANS)?;
    Ok(reply(mock::payment_summary()))
}
