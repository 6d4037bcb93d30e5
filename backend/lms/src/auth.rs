//! Bearer-token sessions and the fixed role set.
//!
//! Tokens are opaque strings handed to users out of band; only their
//! SHA-256 digest is stored in `users.api_token`.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::api::ApiState;
use crate::errors::{AppError, Result};
use crate::models::{Center, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Student,
    Instructor,
    Evaluator,
    Mentor,
    Guardian,
    CenterAdmin,
    NationalAdmin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Student" => Some(Self::Student),
            "Instructor" => Some(Self::Instructor),
            "Evaluator" => Some(Self::Evaluator),
            "Mentor" => Some(Self::Mentor),
            "Guardian" => Some(Self::Guardian),
            "CenterAdmin" => Some(Self::CenterAdmin),
            "NationalAdmin" => Some(Self::NationalAdmin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Instructor => "Instructor",
            Self::Evaluator => "Evaluator",
            Self::Mentor => "Mentor",
            Self::Guardian => "Guardian",
            Self::CenterAdmin => "CenterAdmin",
            Self::NationalAdmin => "NationalAdmin",
        }
    }
}

/// Roles allowed to read and settle payments.
pub const PAYMENT_ADMINS: &[Role] = &[Role::CenterAdmin, Role::NationalAdmin];

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub email: String,
    pub full_name: String,
    pub roles: Vec<Role>,
}

impl CurrentUser {
    /// National admins pass every role check.
    pub fn has_any(&self, roles: &[Role]) -> bool {
        self.roles
            .iter()
            .any(|r| *r == Role::NationalAdmin || roles.contains(r))
    }

    pub fn is_national_admin(&self) -> bool {
        self.roles.contains(&Role::NationalAdmin)
    }
}

/// The caller of a request. Requests without an `Authorization` header are
/// guests.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<CurrentUser>);

impl Session {
    pub fn guest() -> Self {
        Self(None)
    }

    pub fn current(&self) -> Option<&CurrentUser> {
        self.0.as_ref()
    }

    pub fn user(&self) -> Result<&CurrentUser> {
        self.0
            .as_ref()
            .ok_or_else(|| AppError::Unauthenticated("Connexion requise".to_string()))
    }

    pub fn require(&self, roles: &[Role]) -> Result<&CurrentUser> {
        let user = self.user()?;
        if user.has_any(roles) {
            Ok(user)
        } else {
            Err(AppError::forbidden("Accès non autorisé"))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Session::guest());
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthenticated("En-tête Authorization invalide".into()))?;

        match find_user_by_token(&state.pool, token).await? {
            Some(user) => Ok(Session(Some(user))),
            None => Err(AppError::Unauthenticated("Jeton invalide".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn parse_roles(raw: &str) -> Vec<Role> {
    raw.split(',').filter_map(Role::parse).collect()
}

pub async fn find_user_by_token(pool: &SqlitePool, token: &str) -> Result<Option<CurrentUser>> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT email, full_name, roles FROM users WHERE api_token = ?1")
            .bind(hash_token(token))
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(email, full_name, roles)| CurrentUser {
        email,
        full_name,
        roles: parse_roles(&roles),
    }))
}

/// Create or update a user. `token`, when given, replaces the stored one.
pub async fn upsert_user(
    pool: &SqlitePool,
    email: &str,
    full_name: &str,
    roles: &[Role],
    token: Option<&str>,
) -> Result<()> {
    let roles = roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(",");
    sqlx::query(
        r#"
        INSERT INTO users (email, full_name, roles, api_token)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (email) DO UPDATE SET
            full_name = excluded.full_name,
            roles     = excluded.roles,
            api_token = COALESCE(excluded.api_token, users.api_token)
        "#,
    )
    .bind(email)
    .bind(full_name)
    .bind(roles)
    .bind(token.map(hash_token))
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Profiles and scopes
// ─────────────────────────────────────────────────────────

/// Student profile linked to the session user, if any.
pub async fn current_student(pool: &SqlitePool, session: &Session) -> Result<Option<Student>> {
    let Some(user) = session.current() else {
        return Ok(None);
    };
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE user = ?1")
        .bind(&user.email)
        .fetch_optional(pool)
        .await?;
    Ok(student)
}

/// Like [`current_student`] but refuses callers without a profile.
pub async fn require_student(pool: &SqlitePool, session: &Session) -> Result<Student> {
    session.user()?;
    current_student(pool, session)
        .await?
        .ok_or_else(|| AppError::validation("Profil étudiant non trouvé"))
}

pub async fn administered_center(pool: &SqlitePool, email: &str) -> Result<Option<Center>> {
    let center = sqlx::query_as::<_, Center>("SELECT * FROM centers WHERE admin_user = ?1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(center)
}

/// Center a dashboard request applies to.
///
/// Center admins are pinned to the center they administer; national admins
/// may name any center and otherwise fall back to their own.
pub async fn resolve_center(
    pool: &SqlitePool,
    user: &CurrentUser,
    requested: Option<&str>,
) -> Result<String> {
    let own = administered_center(pool, &user.email).await?.map(|c| c.id);
    let requested = requested.filter(|c| !c.is_empty());

    if user.is_national_admin() {
        return requested
            .map(str::to_string)
            .or(own)
            .ok_or_else(|| AppError::validation("Aucun centre associé à votre compte"));
    }

    let own = own.ok_or_else(|| AppError::forbidden("Aucun centre associé à votre compte"))?;
    match requested {
        Some(c) if c != own => Err(AppError::forbidden("Accès refusé à ce centre")),
        _ => Ok(own),
    }
}

/// Refuse payment administration outside the caller's center.
pub async fn ensure_payment_admin(
    pool: &SqlitePool,
    user: &CurrentUser,
    payment_center: Option<&str>,
) -> Result<()> {
    if user.is_national_admin() {
        return Ok(());
    }
    if !user.has_any(&[Role::CenterAdmin]) {
        return Err(AppError::forbidden("Permission refusée"));
    }
    let own = administered_center(pool, &user.email).await?.map(|c| c.id);
    match (own.as_deref(), payment_center) {
        (Some(own), Some(center)) if own == center => Ok(()),
        _ => Err(AppError::forbidden("Permission refusée")),
    }
}
