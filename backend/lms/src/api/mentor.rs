//! `mentor.*` routes over simulated mentee data.

use axum::{extract::Query, Json};
use serde::{Deserialize, Serialize};

use super::{non_empty, reply, ApiResult};
use crate::auth::{Role, Session};
use crate::mock::{
    self, Conversation, Dismissed, EcProgress, FeedItem, Learner, Message, MenteeStats,
    MentorAlert, MentorStats, MonthProgress, ProgressSummary,
};

const MENTORS: &[Role] = &[Role::Mentor];

#[derive(Debug, Serialize)]
pub struct MentorProfile {
    pub user: String,
    pub full_name: String,
    pub specialty: &'static str,
    pub since: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MentorDashboard {
    pub mentor: MentorProfile,
    pub stats: MentorStats,
    pub mentees: Vec<Learner>,
    pub alerts: Vec<MentorAlert>,
    pub recent_activity: Vec<FeedItem>,
}

/// `GET mentor.get_mentor_dashboard`
pub async fn get_mentor_dashboard(session: Session) -> ApiResult<MentorDashboard> {
    let user = session.require(MENTORS)?;
    let mentees = mock::mentees();
    Ok(reply(MentorDashboard {
        mentor: MentorProfile {
            user: user.email.clone(),
            full_name: user.full_name.clone(),
            specialty: "Informatique",
            since: "2024-01-01",
        },
        stats: mock::mentor_stats(&mentees),
        mentees,
        alerts: mock::mentor_alerts(Some("active")),
        recent_activity: mock::mentor_activity(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MenteesQuery {
    pub status: Option<String>,
    pub year: Option<String>,
}

/// `GET mentor.get_my_mentees`
pub async fn get_my_mentees(
    session: Session,
    Query(q): Query<MenteesQuery>,
) -> ApiResult<Vec<Learner>> {
    session.require(MENTORS)?;
    Ok(reply(mock::filter_mentees(
        non_empty(&q.status),
        non_empty(&q.year),
    )))
}

#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    #[serde(default)]
    pub student_id: String,
}

#[derive(Debug, Serialize)]
pub struct MenteeDetail {
    pub student: Learner,
    pub progress: ProgressSummary,
    pub ecs: Vec<EcProgress>,
    pub activity: Vec<mock::ActivityLine>,
    pub progress_trend: Vec<MonthProgress>,
}

/// `GET mentor.get_mentee_detail`
pub async fn get_mentee_detail(
    session: Session,
    Query(q): Query<StudentQuery>,
) -> ApiResult<MenteeDetail> {
    session.require(MENTORS)?;
    let student = mock::find(mock::mentees(), &q.student_id, "Mentoré non trouvé")?;
    Ok(reply(MenteeDetail {
        student,
        progress: mock::sample_progress(),
        ecs: mock::sample_ecs(),
        activity: mock::mentee_history(),
        progress_trend: mock::progress_trend(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub student_id: Option<String>,
    pub limit: Option<usize>,
}

/// A thread with one mentee, or the list of conversations.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Messages {
    Thread(Vec<Message>),
    Conversations(Vec<Conversation>),
}

/// `GET mentor.get_messages`
pub async fn get_messages(
    session: Session,
    Query(q): Query<MessagesQuery>,
) -> ApiResult<Messages> {
    session.require(MENTORS)?;
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    Ok(reply(match non_empty(&q.student_id) {
        Some(_) => Messages::Thread(mock::thread(limit)),
        None => Messages::Conversations(mock::conversations()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub content: String,
}

/// `POST mentor.send_message`
pub async fn send_message(
    session: Session,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<Message> {
    session.require(MENTORS)?;
    Ok(reply(mock::compose(&body.student_id, &body.content)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    pub status: Option<String>,
}

/// `GET mentor.get_alerts`
pub async fn get_alerts(
    session: Session,
    Query(q): Query<AlertsQuery>,
) -> ApiResult<Vec<MentorAlert>> {
    session.require(MENTORS)?;
    let status = non_empty(&q.status).unwrap_or("active");
    Ok(reply(mock::mentor_alerts(Some(status))))
}

#[derive(Debug, Deserialize)]
pub struct DismissBody {
    #[serde(default)]
    pub alert_id: String,
}

/// `POST mentor.dismiss_alert`
pub async fn dismiss_alert(
    session: Session,
    Json(body): Json<DismissBody>,
) -> ApiResult<Dismissed> {
    session.require(MENTORS)?;
    Ok(reply(mock::dismiss(&body.alert_id)?))
}

/// `GET mentor.get_mentee_stats`
pub async fn get_mentee_stats(
    session: Session,
    Query(q): Query<StudentQuery>,
) -> ApiResult<MenteeStats> {
    session.require(MENTORS)?;
    mock::require_student_id(&q.student_id)?;
    Ok(reply(mock::mentee_stats()))
}
