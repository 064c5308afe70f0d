use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use friendnest_store::User;

use super::{created, data, message, ApiResult, AppState, Created, Message};
use crate::accounts::{self, AuthSession, LoginInput, ProfileInput, SignupInput};
use crate::error::ServerError;
use crate::session::{AuthUser, SessionToken};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/onboarding", post(onboard))
        .route("/me", get(me))
}

async fn signup(State(state): State<AppState>, Json(input): Json<SignupInput>) -> Created<AuthSession> {
    Ok(created(accounts::signup(&state, input).await?))
}

async fn login(State(state): State<AppState>, Json(input): Json<LoginInput>) -> ApiResult<AuthSession> {
    Ok(data(accounts::login(&state, input).await?))
}

async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<Json<Message>, ServerError> {
    accounts::logout(&*state.db()?, &token)?;
    Ok(message("Logout successful"))
}

async fn onboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<ProfileInput>,
) -> ApiResult<User> {
    Ok(data(accounts::onboard(&state, &user, input).await?))
}

async fn me(AuthUser(user): AuthUser) -> ApiResult<User> {
    Ok(data(user))
}

#[derive(Serialize)]
pub(super) struct ChatToken {
    token: String,
}

pub(super) async fn chat_token(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<ChatToken> {
    let token = accounts::chat_token(&state, &user)?;
    Ok(data(ChatToken { token }))
}
