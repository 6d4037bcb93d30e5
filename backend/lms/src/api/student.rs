//! `student.*` routes: progress, dashboard, student records and assignments.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::{non_empty, reply, ApiResult, ApiState};
use crate::auth::{self, CurrentUser, Role, Session};
use crate::db;
use crate::enrollment::{self, StudentProgress};
use crate::errors::{is_unique_violation, AppError, Result};
use crate::models::{EnrollmentStatus, Student, YEARS};

/// Roles that may look at any student's progress.
const STAFF: &[Role] = &[
    Role::Instructor,
    Role::Evaluator,
    Role::Mentor,
    Role::CenterAdmin,
    Role::NationalAdmin,
];

async fn ensure_can_view(pool: &SqlitePool, session: &Session, student_id: &str) -> Result<()> {
    let user = session.user()?;
    if user.has_any(STAFF) {
        return Ok(());
    }
    match auth::current_student(pool, session).await? {
        Some(own) if own.id == student_id => Ok(()),
        _ => Err(AppError::forbidden("Accès non autorisé à ce profil")),
    }
}

async fn progress_of(pool: &SqlitePool, student_id: &str) -> Result<StudentProgress> {
    let student = db::fetch_student(pool, student_id).await?;
    enrollment::student_progress(pool, &student.id, student.current_year.as_deref()).await
}

#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    pub student_id: Option<String>,
}

/// `GET student.get_student_progress`
pub async fn get_student_progress(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<StudentQuery>,
) -> ApiResult<StudentProgress> {
    let student_id = non_empty(&q.student_id)
        .ok_or_else(|| AppError::validation("student_id est requis"))?;
    ensure_can_view(&state.pool, &session, student_id).await?;
    Ok(reply(progress_of(&state.pool, student_id).await?))
}

#[derive(Debug, Serialize)]
pub struct StudentCard {
    pub name: String,
    pub full_name: String,
    pub center: Option<String>,
    pub current_year: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentActivity {
    pub ec: String,
    pub ec_title: Option<String>,
    pub status: EnrollmentStatus,
    pub modified_at: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PendingPayment {
    pub id: String,
    pub ec: String,
    pub amount: i64,
    pub provider: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct StudentDashboard {
    pub student: StudentCard,
    pub progress: StudentProgress,
    pub recent_activities: Vec<RecentActivity>,
    pub pending_payments: Vec<PendingPayment>,
}

/// `GET student.get_student_dashboard`
pub async fn get_student_dashboard(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Query(q): Query<StudentQuery>,
) -> ApiResult<StudentDashboard> {
    let pool = &state.pool;
    let student_id = match non_empty(&q.student_id) {
        Some(id) => {
            ensure_can_view(pool, &session, id).await?;
            id.to_string()
        }
        None => auth::current_student(pool, &session)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| AppError::validation("Profil étudiant non trouvé"))?,
    };

    let progress = progress_of(pool, &student_id).await?;
    let student = db::fetch_student(pool, &student_id).await?;

    let recent_activities = sqlx::query_as::<_, RecentActivity>(
        r#"
        SELECT e.ec, ec.title AS ec_title, e.status, e.modified_at
        FROM   enrollments e
        LEFT JOIN ecs ec ON ec.id = e.ec
        WHERE  e.student = ?1
        ORDER  BY e.modified_at DESC, e.id ASC
        LIMIT  5
        "#,
    )
    .bind(&student.id)
    .fetch_all(pool)
    .await?;

    let pending_payments = sqlx::query_as::<_, PendingPayment>(
        r#"
        SELECT id, ec, amount, provider, created_at
        FROM   payments
        WHERE  student = ?1 AND status = 'Pending'
        ORDER  BY created_at DESC
        "#,
    )
    .bind(&student.id)
    .fetch_all(pool)
    .await?;

    Ok(reply(StudentDashboard {
        student: StudentCard {
            name: student.id,
            full_name: student.full_name,
            center: student.center,
            current_year: student.current_year,
        },
        progress,
        recent_activities,
        pending_payments,
    }))
}

// ─────────────────────────────────────────────────────────
// Student records
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub center: Option<String>,
    pub current_year: Option<String>,
}

/// Insert a student. `full_name` is derived from the name parts, and an
/// e-mail without an account gets a `Student` user linked to the record.
pub async fn create(pool: &SqlitePool, user: &CurrentUser, new: &NewStudent) -> Result<Student> {
    let first = new.first_name.trim();
    let last = new.last_name.trim();
    if first.is_empty() || last.is_empty() {
        return Err(AppError::validation("Le nom et le prénom sont requis"));
    }
    let year = new.current_year.as_deref().filter(|y| !y.is_empty());
    if let Some(year) = year {
        if !YEARS.iter().any(|(code, _)| *code == year) {
            return Err(AppError::validation(format!("Année invalide: {year}")));
        }
    }

    let requested = new.center.as_deref().filter(|c| !c.is_empty());
    let center = if user.is_national_admin() {
        requested.map(str::to_string)
    } else {
        Some(auth::resolve_center(pool, user, requested).await?)
    };
    if let Some(center) = &center {
        db::fetch_center(pool, center).await?;
    }

    let email = new
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase);
    let full_name = format!("{first} {last}");
    if let Some(email) = &email {
        let has_account: Option<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE email = ?1")
                .bind(email)
                .fetch_optional(pool)
                .await?;
        if has_account.is_none() {
            auth::upsert_user(pool, email, &full_name, &[Role::Student], None).await?;
            info!("User {email} created for new student");
        }
    }

    if let Some(email) = &email {
        let linked: Option<String> = sqlx::query_scalar("SELECT id FROM students WHERE user = ?1")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        if linked.is_some() {
            return Err(already_linked(email));
        }
    }

    let id = db::new_id("STU");
    let inserted = sqlx::query(
        r#"
        INSERT INTO students
            (id, first_name, last_name, full_name, email, phone, user, center, current_year)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5, ?7, ?8)
        "#,
    )
    .bind(&id)
    .bind(first)
    .bind(last)
    .bind(&full_name)
    .bind(&email)
    .bind(new.phone.as_deref().filter(|p| !p.is_empty()))
    .bind(&center)
    .bind(year)
    .execute(pool)
    .await;
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(already_linked(email.as_deref().unwrap_or_default()))
        }
        Err(e) => return Err(e.into()),
    }

    info!("Student {id} created by {}", user.email);
    db::fetch_student(pool, &id).await
}

fn already_linked(email: &str) -> AppError {
    AppError::Conflict(format!("Un étudiant est déjà lié au compte {email}"))
}

/// `POST student.create_student`
pub async fn create_student(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<NewStudent>,
) -> ApiResult<Student> {
    let user = session.require(&[Role::CenterAdmin])?;
    Ok(reply(create(&state.pool, user, &body).await?))
}

// ─────────────────────────────────────────────────────────
// Assignments
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssignmentBody {
    pub ec_id: String,
    #[serde(default = "default_submission_type")]
    pub submission_type: String,
    pub file_url: Option<String>,
    pub content: Option<String>,
}

fn default_submission_type() -> String {
    "Devoir".to_string()
}

#[derive(Debug, Serialize)]
pub struct SubmittedAssignment {
    pub submission_id: String,
    pub status: &'static str,
    pub message: String,
}

pub async fn submit(pool: &SqlitePool, student: &Student, body: &AssignmentBody) -> Result<SubmittedAssignment> {
    let ec = db::fetch_ec(pool, &body.ec_id).await?;
    let enrollment = enrollment::find_enrollment(pool, &student.id, &ec.id)
        .await?
        .ok_or_else(|| AppError::validation("Vous devez d'abord payer cet EC"))?;
    if enrollment.status == EnrollmentStatus::Validated {
        return Err(AppError::validation("Cet EC est déjà validé"));
    }
    let file_url = non_empty(&body.file_url);
    let content = non_empty(&body.content);
    if file_url.is_none() && content.is_none() {
        return Err(AppError::validation(
            "Joignez un fichier ou saisissez votre réponse",
        ));
    }

    let id = db::new_id("SUB");
    sqlx::query(
        r#"
        INSERT INTO submissions (id, student, ec, submission_type, file_url, content, status, submission_date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'Pending', ?7)
        "#,
    )
    .bind(&id)
    .bind(&student.id)
    .bind(&ec.id)
    .bind(body.submission_type.trim())
    .bind(file_url)
    .bind(content)
    .bind(db::now())
    .execute(pool)
    .await?;

    info!("Submission {id} received from {} for EC {}", student.id, ec.id);
    Ok(SubmittedAssignment {
        submission_id: id,
        status: "pending",
        message: "Devoir soumis, en attente de correction".to_string(),
    })
}

/// `POST student.submit_assignment`
pub async fn submit_assignment(
    State(state): State<Arc<ApiState>>,
    session: Session,
    Json(body): Json<AssignmentBody>,
) -> ApiResult<SubmittedAssignment> {
    let student = auth::require_student(&state.pool, &session).await?;
    Ok(reply(submit(&state.pool, &student, &body).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        make_center_admin, pool, seed_catalog, seed_enrollment, seed_student, user_with_roles,
    };

    fn new_student(first: &str, email: Option<&str>) -> NewStudent {
        NewStudent {
            first_name: first.to_string(),
            last_name: "Rasoa".to_string(),
            email: email.map(str::to_string),
            current_year: Some("L2".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creating_a_student_links_a_new_account() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let admin = make_center_admin(&pool, "CTR-TANA", "admin@tana.mg").await;

        let student = create(&pool, &admin, &new_student("Fara", Some(" Fara@Mail.mg ")))
            .await
            .unwrap();
        assert_eq!(student.full_name, "Fara Rasoa");
        assert_eq!(student.user.as_deref(), Some("fara@mail.mg"));
        assert_eq!(student.center.as_deref(), Some("CTR-TANA"));

        let roles: String = sqlx::query_scalar("SELECT roles FROM users WHERE email = 'fara@mail.mg'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(roles, "Student");
    }

    #[tokio::test]
    async fn center_admin_cannot_create_elsewhere() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        crate::test_support::seed_center(&pool, "CTR-FIANAR", None).await;
        let admin = make_center_admin(&pool, "CTR-TANA", "admin@tana.mg").await;
        let mut new = new_student("Hery", None);
        new.center = Some("CTR-FIANAR".to_string());
        let err = create(&pool, &admin, &new).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let national = user_with_roles("root@cntemad.mg", &[Role::NationalAdmin]);
        let student = create(&pool, &national, &new).await.unwrap();
        assert_eq!(student.center.as_deref(), Some("CTR-FIANAR"));

        new.current_year = Some("L9".to_string());
        assert!(matches!(
            create(&pool, &national, &new).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn an_account_links_a_single_student() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let national = user_with_roles("root@cntemad.mg", &[Role::NationalAdmin]);

        create(&pool, &national, &new_student("Fara", Some("same@cntemad.mg")))
            .await
            .unwrap();
        let err = create(&pool, &national, &new_student("Tiana", Some("SAME@cntemad.mg")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.to_string(), "Un étudiant est déjà lié au compte same@cntemad.mg");

        let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE user = 'same@cntemad.mg'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(linked, 1);

        // The index holds for direct writes too; students without an account are unaffected.
        let dup = sqlx::query(
            r#"
            INSERT INTO students (id, first_name, last_name, full_name, user)
            VALUES ('STU-DUP', 'Tiana', 'Rasoa', 'Tiana Rasoa', 'same@cntemad.mg')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap_err();
        assert!(crate::errors::is_unique_violation(&dup));

        create(&pool, &national, &new_student("Lova", None)).await.unwrap();
        create(&pool, &national, &new_student("Niry", None)).await.unwrap();
    }

    #[tokio::test]
    async fn assignments_need_an_open_enrollment_and_a_body() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let body = AssignmentBody {
            ec_id: "DROIT101".to_string(),
            submission_type: default_submission_type(),
            file_url: None,
            content: Some("Ma dissertation".to_string()),
        };
        assert!(submit(&pool, &student, &body).await.is_err());

        seed_enrollment(&pool, "STU-0001", "DROIT101", "In Progress").await;
        let empty = AssignmentBody {
            content: Some("   ".to_string()),
            ..body
        };
        assert!(submit(&pool, &student, &empty).await.is_err());

        let ok = AssignmentBody {
            content: Some("Ma dissertation".to_string()),
            ..empty
        };
        let done = submit(&pool, &student, &ok).await.unwrap();
        assert_eq!(done.status, "pending");
        let status: String = sqlx::query_scalar("SELECT status FROM submissions WHERE id = ?1")
            .bind(&done.submission_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "Pending");
    }
}
