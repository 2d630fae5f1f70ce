use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use zip_db::models::{NewUser, UserRow};
use zip_types::api::{AuthResponse, Claims, Envelope, SessionResponse, SignInRequest, SignUpRequest, UserSummary};
use zip_types::models::UserRole;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const TOKEN_TTL_DAYS: i64 = 7;
const MIN_PASSWORD_LEN: usize = 8;

/// Verified against when the email is unknown, so both sign-in failures
/// pay for one Argon2 check.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| hash_password("zip-unknown-account").unwrap_or_default());

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }
    let name = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let user_id = Uuid::new_v4();
    let row = blocking(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let id = user_id.to_string();
        let inserted = db.create_user(&NewUser {
            id: &id,
            email: &email,
            password_hash: &password_hash,
            role: UserRole::Renter,
            name: name.as_deref(),
        })?;
        if !inserted {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        db.get_user_by_id(&id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {} missing after insert", id)))
    })
    .await?;

    info!("Registered user {}", row.id);

    let access_token = create_token(&state.jwt_secret, user_id, &row.email)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(AuthResponse { user: user_summary(&row), access_token })),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<Envelope<AuthResponse>>, ApiError> {
    let email = req.email.trim().to_lowercase();

    let row = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_email(&email)? else {
            let _ = verify_password(&req.password, &DUMMY_HASH);
            return Err(ApiError::InvalidCredentials);
        };
        verify_password(&req.password, &user.password_hash)?;
        Ok(user)
    })
    .await?;

    let user = user_summary(&row);
    let access_token = create_token(&state.jwt_secret, user.id, &user.email)?;
    Ok(Json(Envelope::ok(AuthResponse { user, access_token })))
}

pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Envelope<SessionResponse<UserSummary>>>, ApiError> {
    let id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_user_by_id(&id)?.ok_or(ApiError::Unauthorized)).await?;

    Ok(Json(Envelope::ok(SessionResponse { user: user_summary(&row) })))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::validation("A valid email is required")),
    }
}

/// Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        warn!("Unparseable password hash: {}", e);
        ApiError::InvalidCredentials
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

/// Stored ids are always written as UUIDs; a corrupt one is logged and
/// surfaces as the nil id.
pub(crate) fn parse_uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt UUID '{}' in DB: {}", raw, e);
        Uuid::nil()
    })
}

pub(crate) fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&row.id),
        email: row.email.clone(),
        name: row.name.clone(),
        avatar: row.avatar.clone(),
        role: row.role,
    }
}
