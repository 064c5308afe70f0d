//! Signup, login, profile and account settings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use friendnest_shared::constants::MIN_PASSWORD_LEN;
use friendnest_shared::settings::SettingsPatch;
use friendnest_shared::validation::{missing_fields, non_blank, validate_email, validate_password};
use friendnest_shared::Role;
use friendnest_store::{Database, NewUser, ProfileUpdate, User};

use crate::api::AppState;
use crate::config::AdminSeed;
use crate::error::{ServerError, StoreResultExt};
use crate::session::{
    hash_password, hash_password_blocking, issue_session, token_hash, verify_password_blocking,
};

const EMAIL_TAKEN: &str = "Email already exists";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Used for both onboarding (every field but the picture required) and
/// partial profile updates.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileInput {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailChange {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountDeletion {
    pub password: Option<String>,
}

/// A freshly authenticated user and their bearer token.
#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn random_avatar() -> String {
    let idx = rand::thread_rng().gen_range(1..=100);
    format!("https://avatar.iran.liara.run/public/{idx}.png")
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

pub async fn signup(state: &AppState, input: SignupInput) -> Result<AuthSession, ServerError> {
    let (Some(email), Some(password), Some(full_name)) = (
        non_blank(input.email.as_deref()),
        input.password.filter(|p| !p.is_empty()),
        non_blank(input.full_name.as_deref()),
    ) else {
        return Err(ServerError::BadRequest("All fields are required".into()));
    };
    let email = normalize_email(&email);
    validate_email(&email)?;
    validate_password(&password)?;

    let password_hash = hash_password_blocking(password).await?;

    let (user, token) = {
        let db = state.db()?;
        if db.find_user_by_email(&email)?.is_some() {
            return Err(ServerError::Conflict(
                "Email already exists, please use a different one".into(),
            ));
        }
        let user = db
            .create_user(&NewUser {
                full_name,
                email,
                password_hash,
                profile_pic: random_avatar(),
                role: Role::User,
            })
            .or_conflict("Email already exists, please use a different one")?;
        let token = issue_session(&db, user.id, state.config.session_ttl_hours)?;
        (user, token)
    };
    tracing::info!(user_id = %user.id, "user signed up");

    state.chat.upsert_user(&user).await;
    Ok(AuthSession { user, token })
}

/// Check an email/password pair. Unknown emails and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate(state: &AppState, input: LoginInput) -> Result<User, ServerError> {
    let (Some(email), Some(password)) = (
        non_blank(input.email.as_deref()),
        input.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ServerError::BadRequest("All fields are required".into()));
    };

    let user = state.db()?.find_user_by_email(&normalize_email(&email))?;
    if let Some(user) = user {
        if verify_password_blocking(password, user.password_hash.clone()).await? {
            return Ok(user);
        }
    }
    tracing::debug!("login rejected");
    Err(ServerError::Unauthorized("Invalid email or password".into()))
}

pub async fn login(state: &AppState, input: LoginInput) -> Result<AuthSession, ServerError> {
    let user = authenticate(state, input).await?;
    let token = issue_session(&*state.db()?, user.id, state.config.session_ttl_hours)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(AuthSession { user, token })
}

pub fn logout(db: &Database, token: &str) -> Result<(), ServerError> {
    db.delete_session(&token_hash(token))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

pub async fn onboard(state: &AppState, user: &User, input: ProfileInput) -> Result<User, ServerError> {
    let missing = missing_fields(&[
        ("fullName", input.full_name.as_deref()),
        ("bio", input.bio.as_deref()),
        ("nativeLanguage", input.native_language.as_deref()),
        ("learningLanguage", input.learning_language.as_deref()),
        ("location", input.location.as_deref()),
    ]);
    if !missing.is_empty() {
        return Err(ServerError::BadRequest(format!(
            "All fields are required. Missing: {}",
            missing.join(", ")
        )));
    }

    let updated = state.db()?.update_profile(
        user.id,
        &ProfileUpdate {
            full_name: non_blank(input.full_name.as_deref()),
            bio: non_blank(input.bio.as_deref()),
            native_language: non_blank(input.native_language.as_deref()),
            learning_language: non_blank(input.learning_language.as_deref()),
            location: non_blank(input.location.as_deref()),
            profile_pic: non_blank(input.profile_pic.as_deref()),
            is_onboarded: Some(true),
        },
    )?;
    tracing::info!(user_id = %user.id, "user onboarded");

    state.chat.upsert_user(&updated).await;
    Ok(updated)
}

/// Partial update. Name, languages and picture ignore blank values; bio
/// and location may be cleared.
pub async fn update_profile(state: &AppState, user: &User, input: ProfileInput) -> Result<User, ServerError> {
    let updated = state
        .db()?
        .update_profile(
            user.id,
            &ProfileUpdate {
                full_name: non_blank(input.full_name.as_deref()),
                bio: input.bio,
                native_language: non_blank(input.native_language.as_deref()),
                learning_language: non_blank(input.learning_language.as_deref()),
                location: input.location,
                profile_pic: non_blank(input.profile_pic.as_deref()),
                is_onboarded: None,
            },
        )
        .or_not_found("User not found")?;

    state.chat.upsert_user(&updated).await;
    Ok(updated)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn update_email(state: &AppState, user: &User, input: EmailChange) -> Result<User, ServerError> {
    let (Some(email), Some(password)) = (
        non_blank(input.email.as_deref()),
        input.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ServerError::BadRequest("Email and password are required".into()));
    };
    let email = normalize_email(&email);
    validate_email(&email)?;

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        return Err(ServerError::Unauthorized("Incorrect password".into()));
    }

    let db = state.db()?;
    if let Some(other) = db.find_user_by_email(&email)? {
        if other.id != user.id {
            return Err(ServerError::Conflict(EMAIL_TAKEN.into()));
        }
    }

    let updated = db.update_email(user.id, &email).or_conflict(EMAIL_TAKEN)?;
    tracing::info!(user_id = %user.id, "email updated");
    Ok(updated)
}

/// Change the password. Existing sessions stay valid.
pub async fn update_password(state: &AppState, user: &User, input: PasswordChange) -> Result<(), ServerError> {
    let (Some(current), Some(new)) = (
        input.current_password.filter(|p| !p.is_empty()),
        input.new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ServerError::BadRequest(
            "Current password and new password are required".into(),
        ));
    };
    if validate_password(&new).is_err() {
        return Err(ServerError::BadRequest(format!(
            "New password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if !verify_password_blocking(current, user.password_hash.clone()).await? {
        return Err(ServerError::Unauthorized("Current password is incorrect".into()));
    }

    let hash = hash_password_blocking(new).await?;
    state.db()?.update_password_hash(user.id, &hash)?;
    tracing::info!(user_id = %user.id, "password updated");
    Ok(())
}

pub fn update_settings(db: &Database, user: &User, patch: SettingsPatch) -> Result<User, ServerError> {
    let mut settings = user.settings.clone();
    settings.apply(patch);
    Ok(db.update_settings(user.id, &settings)?)
}

/// Delete the caller's account after a password check. Groups the user
/// created go with it; their chat channels and the chat user are removed
/// best-effort afterwards.
pub async fn delete_account(state: &AppState, user: &User, input: AccountDeletion) -> Result<(), ServerError> {
    let Some(password) = input.password.filter(|p| !p.is_empty()) else {
        return Err(ServerError::BadRequest(
            "Password is required to delete account".into(),
        ));
    };
    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        return Err(ServerError::Unauthorized("Incorrect password".into()));
    }

    let channel_ids = remove_user(&*state.db()?, user.id)?;
    tracing::info!(user_id = %user.id, groups = channel_ids.len(), "account deleted");

    state.chat.delete_channels(&channel_ids).await;
    state.chat.delete_user(user.id).await;
    Ok(())
}

/// Delete a user and return the chat channel ids of the groups that went
/// with them.
pub(crate) fn remove_user(db: &Database, user_id: uuid::Uuid) -> Result<Vec<String>, ServerError> {
    let channel_ids: Vec<String> = db
        .groups_created_by(user_id)?
        .into_iter()
        .map(|g| g.stream_channel_id)
        .filter(|id| !id.is_empty())
        .collect();
    if !db.delete_user(user_id)? {
        return Err(ServerError::NotFound("User not found".into()));
    }
    Ok(channel_ids)
}

pub fn chat_token(state: &AppState, user: &User) -> Result<String, ServerError> {
    state.chat.user_token(user.id)
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Make sure the configured administrator exists and has the admin role.
pub fn ensure_admin(db: &Database, seed: &AdminSeed) -> Result<User, ServerError> {
    let email = normalize_email(&seed.email);

    if let Some(existing) = db.find_user_by_email(&email)? {
        if !existing.role.is_admin() {
            db.set_role(existing.id, Role::Admin)?;
            tracing::info!(user_id = %existing.id, "promoted seeded user to admin");
        }
        return Ok(db.get_user(existing.id)?);
    }

    let admin = db.create_user(&NewUser {
        full_name: seed.full_name.clone(),
        email,
        password_hash: hash_password(&seed.password)?,
        profile_pic: random_avatar(),
        role: Role::Admin,
    })?;
    db.update_profile(
        admin.id,
        &ProfileUpdate {
            is_onboarded: Some(true),
            ..Default::default()
        },
    )?;
    tracing::info!(user_id = %admin.id, "admin account created");
    Ok(db.get_user(admin.id)?)
}
