//! Fixtures shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use friendnest_shared::Role;
use friendnest_store::{Database, NewUser, ProfileUpdate, User};

use crate::api::AppState;
use crate::chat::fake::RecordingProvider;
use crate::chat::Chat;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

/// An onboarded user with a placeholder password hash.
pub(crate) fn user(db: &Database, name: &str) -> User {
    let created = db
        .create_user(&NewUser {
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "not-a-hash".to_string(),
            profile_pic: String::new(),
            role: Role::User,
        })
        .unwrap();
    db.update_profile(
        created.id,
        &ProfileUpdate {
            is_onboarded: Some(true),
            ..Default::default()
        },
    )
    .unwrap()
}

pub(crate) fn befriend(db: &Database, a: &User, b: &User) {
    let request = db.create_friend_request(a.id, b.id).unwrap();
    db.accept_friend_request(request.id).unwrap();
}

/// Application state over an in-memory database and a recording chat fake.
pub(crate) fn state_with(provider: Arc<RecordingProvider>) -> AppState {
    let config = ServerConfig::default();
    let window = Duration::from_secs(friendnest_shared::constants::RATE_LIMIT_WINDOW_SECS);
    AppState {
        db: Arc::new(Mutex::new(Database::open_in_memory().unwrap())),
        chat: Chat::new(provider, Duration::from_secs(1)),
        admin_limiter: RateLimiter::admin(config.admin_rate_limit, window),
        admin_login_limiter: RateLimiter::admin_login(config.admin_login_rate_limit, window),
        config: Arc::new(config),
    }
}

pub(crate) fn state() -> (AppState, Arc<RecordingProvider>) {
    let provider = Arc::new(RecordingProvider::default());
    (state_with(provider.clone()), provider)
}
