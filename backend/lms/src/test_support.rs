//! Fixtures shared by the unit tests: an in-memory database and a small
//! catalog around the Antananarivo center.

use sqlx::SqlitePool;

use crate::api::ApiState;
use crate::auth::{self, CurrentUser, Role};
use crate::config::Config;
use crate::db;
use crate::models::{Ec, Student};

pub async fn pool() -> SqlitePool {
    db::init_pool("sqlite::memory:").await.unwrap()
}

pub fn state(pool: SqlitePool) -> ApiState {
    ApiState::new(pool, Config::local("sqlite::memory:")).unwrap()
}

pub fn user_with_roles(email: &str, roles: &[Role]) -> CurrentUser {
    CurrentUser {
        email: email.to_string(),
        full_name: email.to_string(),
        roles: roles.to_vec(),
    }
}

pub fn ec(id: &str, price: i64) -> Ec {
    Ec {
        id: id.to_string(),
        code: None,
        title: id.to_string(),
        description: None,
        course: None,
        year: Some("L1".to_string()),
        price,
        duration_hours: 0,
        image: None,
        content: None,
        is_published: true,
        sort_order: 0,
        is_mandatory: true,
        grading_rubric: None,
        created_at: 0,
        modified_at: 0,
    }
}

pub async fn seed_center(pool: &SqlitePool, id: &str, admin: Option<&str>) {
    if let Some(email) = admin {
        auth::upsert_user(pool, email, email, &[Role::CenterAdmin], None)
            .await
            .unwrap();
    }
    sqlx::query(
        r#"
        INSERT INTO centers (id, center_name, region, admin_user, admin_email)
        VALUES (?1, ?2, 'Analamanga', ?3, ?3)
        "#,
    )
    .bind(id)
    .bind(format!("Centre {id}"))
    .bind(admin)
    .execute(pool)
    .await
    .unwrap();
}

/// Make `email` the administrator of `center` and return their session user.
pub async fn make_center_admin(pool: &SqlitePool, center: &str, email: &str) -> CurrentUser {
    auth::upsert_user(pool, email, email, &[Role::CenterAdmin], None)
        .await
        .unwrap();
    sqlx::query("UPDATE centers SET admin_user = ?2, admin_email = ?2 WHERE id = ?1")
        .bind(center)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    user_with_roles(email, &[Role::CenterAdmin])
}

/// Center `CTR-TANA`, two courses and five ECs:
///
/// | EC       | course   | year | price  | published |
/// |----------|----------|------|--------|-----------|
/// | DROIT101 | DROIT-L1 | L1   | 50 000 | yes       |
/// | DROIT102 | DROIT-L1 | L1   | 60 000 | yes       |
/// | FREE100  | DROIT-L1 | -    | 0      | yes       |
/// | DRAFT1   | DROIT-L1 | L1   | 40 000 | no        |
/// | ECO201   | ECO-L2   | L2   | 70 000 | yes       |
pub async fn seed_catalog(pool: &SqlitePool) {
    seed_center(pool, "CTR-TANA", None).await;

    for (id, title, year) in [
        ("DROIT-L1", "Licence 1 Droit", "L1"),
        ("ECO-L2", "Licence 2 Économie", "L2"),
    ] {
        sqlx::query(
            "INSERT INTO courses (id, title, year, is_published) VALUES (?1, ?2, ?3, 1)",
        )
        .bind(id)
        .bind(title)
        .bind(year)
        .execute(pool)
        .await
        .unwrap();
    }

    let ecs: [(&str, Option<&str>, &str, &str, Option<&str>, i64, bool, i64); 5] = [
        ("DROIT101", Some("DROIT101"), "Introduction au droit", "DROIT-L1", Some("L1"), 50_000, true, 1),
        ("DROIT102", None, "Droit constitutionnel", "DROIT-L1", Some("L1"), 60_000, true, 2),
        ("FREE100", None, "Méthodologie du travail universitaire", "DROIT-L1", None, 0, true, 3),
        ("DRAFT1", None, "Brouillon", "DROIT-L1", Some("L1"), 40_000, false, 4),
        ("ECO201", None, "Microéconomie", "ECO-L2", Some("L2"), 70_000, true, 1),
    ];
    for (id, code, title, course, year, price, published, order) in ecs {
        sqlx::query(
            r#"
            INSERT INTO ecs (id, code, title, course, year, price, is_published, sort_order, duration_hours)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 20)
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(title)
        .bind(course)
        .bind(year)
        .bind(price)
        .bind(published)
        .bind(order)
        .execute(pool)
        .await
        .unwrap();
    }

    let mut conn = pool.acquire().await.unwrap();
    for course in ["DROIT-L1", "ECO-L2"] {
        db::recompute_ec_count(&mut conn, course).await.unwrap();
    }
}

/// A first-year student with a linked `Student` account.
pub async fn seed_student(pool: &SqlitePool, id: &str, email: &str, center: &str) -> Student {
    auth::upsert_user(pool, email, "Rakoto Jean", &[Role::Student], None)
        .await
        .unwrap();
    sqlx::query(
        r#"
        INSERT INTO students (id, first_name, last_name, full_name, email, user, center, current_year)
        VALUES (?1, 'Rakoto', 'Jean', 'Rakoto Jean', ?2, ?2, ?3, 'L1')
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(center)
    .execute(pool)
    .await
    .unwrap();
    db::fetch_student(pool, id).await.unwrap()
}

pub async fn seed_enrollment(pool: &SqlitePool, student: &str, ec: &str, status: &str) -> String {
    let id = db::new_id("ENR");
    let validated = (status == "Validated").then(db::now);
    sqlx::query(
        r#"
        INSERT INTO enrollments (id, student, ec, status, validation_date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(student)
    .bind(ec)
    .bind(status)
    .bind(validated)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// A payment row as it would look after the fact. The center is taken from
/// the student.
pub async fn seed_payment(
    pool: &SqlitePool,
    student: &str,
    ec: &str,
    provider: &str,
    status: &str,
    amount: i64,
    created_at: i64,
) -> String {
    let id = db::new_id("PAY");
    let completed = (status == "Completed").then_some(created_at);
    sqlx::query(
        r#"
        INSERT INTO payments (id, student, ec, center, amount, provider, status,
                              completed_at, created_at, modified_at)
        VALUES (?1, ?2, ?3, (SELECT center FROM students WHERE id = ?2),
                ?4, ?5, ?6, ?7, ?8, ?8)
        "#,
    )
    .bind(&id)
    .bind(student)
    .bind(ec)
    .bind(amount)
    .bind(provider)
    .bind(status)
    .bind(completed)
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap();
    id
}
