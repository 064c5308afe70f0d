//! Password hashing, bearer sessions and the authenticated-user extractors.
//!
//! A session token is 32 random bytes, hex-encoded, handed to the client
//! once.  Only its blake3 hash is stored, so a leaked database does not leak
//! usable tokens.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use friendnest_store::{Database, User};

use crate::api::AppState;
use crate::error::ServerError;

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// [`hash_password`] on the blocking pool. Argon2 must not run on an async
/// worker or under the database lock.
pub async fn hash_password_blocking(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("password task failed: {e}")))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, phc: String) -> Result<bool, ServerError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &phc))
        .await
        .map_err(|e| ServerError::Internal(format!("password task failed: {e}")))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn token_hash(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Create a session for `user_id` and return the bearer token.
pub fn issue_session(db: &Database, user_id: Uuid, ttl_hours: i64) -> Result<String, ServerError> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    db.create_session(&token_hash(&token), user_id, expires_at)?;
    tracing::debug!(%user_id, %expires_at, "session issued");
    Ok(token)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The raw bearer token of the current request.
pub struct SessionToken(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionToken {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        bearer_token(parts)
            .map(|t| SessionToken(t.to_string()))
            .ok_or_else(|| ServerError::Unauthorized("Unauthorized - No token provided".into()))
    }
}

/// A request made with a valid, unexpired session.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let SessionToken(token) = SessionToken::from_request_parts(parts, state).await?;
        let user = {
            let db = state.db()?;
            db.session_user(&token_hash(&token), Utc::now())?
        };
        user.map(AuthUser)
            .ok_or_else(|| ServerError::Unauthorized("Unauthorized - Invalid token".into()))
    }
}

/// An authenticated user whose role is `admin`.
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            tracing::warn!(user_id = %user.id, "non-admin attempted admin access");
            return Err(ServerError::Forbidden(
                "Access denied. Admin privileges required.".into(),
            ));
        }
        Ok(AdminUser(user))
    }
}
