use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use friendnest_shared::settings::SettingsPatch;
use friendnest_shared::validation::non_blank;
use friendnest_shared::UserSort;
use friendnest_store::{FriendRequest, User, UserSearch, UserSummary};

use super::{created, data, message, path_id, ApiResult, AppState, Created, Message};
use crate::accounts::{self, AccountDeletion, EmailChange, PasswordChange, ProfileInput};
use crate::error::ServerError;
use crate::session::AuthUser;
use crate::social::{self, FriendRequests, RequestWithRecipient};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(recommended))
        .route("/friends", get(friends))
        .route("/search", get(search))
        .route("/friend-request/:id", post(send_friend_request))
        .route("/friend-request/:id/accept", put(accept_friend_request))
        .route("/friend-requests", get(friend_requests))
        .route("/outgoing-friend-requests", get(outgoing_friend_requests))
        .route("/profile", put(update_profile))
        .route("/friends/:id", delete(remove_friend))
        .route("/settings/email", put(update_email))
        .route("/settings/password", put(update_password))
        .route("/settings", put(update_settings))
        .route("/account", delete(delete_account))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

async fn recommended(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Vec<User>> {
    let db = state.db()?;
    Ok(data(social::get_recommended_users(&db, user.id)?))
}

async fn friends(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Vec<UserSummary>> {
    let db = state.db()?;
    Ok(data(social::get_my_friends(&db, user.id)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchParams {
    query: Option<String>,
    native_language: Option<String>,
    learning_language: Option<String>,
    location: Option<String>,
    sort_by: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<User>> {
    let search = UserSearch {
        query: non_blank(params.query.as_deref()),
        native_language: non_blank(params.native_language.as_deref()),
        learning_language: non_blank(params.learning_language.as_deref()),
        location: non_blank(params.location.as_deref()),
        sort: UserSort::parse_lenient(params.sort_by.as_deref().unwrap_or_default()),
        ..Default::default()
    };
    let db = state.db()?;
    Ok(data(social::search_users(&db, user.id, search)?))
}

// ---------------------------------------------------------------------------
// Friend requests
// ---------------------------------------------------------------------------

async fn send_friend_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Created<FriendRequest> {
    let recipient_id = path_id(&id, "Recipient not found")?;
    let db = state.db()?;
    Ok(created(social::send_friend_request(&db, user.id, recipient_id)?))
}

async fn accept_friend_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let request_id = path_id(&id, "Friend request not found")?;
    social::accept_friend_request(&*state.db()?, request_id, user.id)?;
    Ok(message("Friend request accepted"))
}

async fn friend_requests(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<FriendRequests> {
    let db = state.db()?;
    Ok(data(social::get_friend_requests(&db, user.id)?))
}

async fn outgoing_friend_requests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<RequestWithRecipient>> {
    let db = state.db()?;
    Ok(data(social::get_outgoing_friend_requests(&db, user.id)?))
}

async fn remove_friend(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let friend_id = path_id(&id, "Friend not found")?;
    social::remove_friend(&*state.db()?, user.id, friend_id)?;
    Ok(message("Friend removed successfully"))
}

// ---------------------------------------------------------------------------
// Profile & settings
// ---------------------------------------------------------------------------

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<ProfileInput>,
) -> ApiResult<User> {
    Ok(data(accounts::update_profile(&state, &user, input).await?))
}

async fn update_email(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<EmailChange>,
) -> ApiResult<User> {
    Ok(data(accounts::update_email(&state, &user, input).await?))
}

async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<PasswordChange>,
) -> Result<Json<Message>, ServerError> {
    accounts::update_password(&state, &user, input).await?;
    Ok(message("Password updated successfully"))
}

async fn update_settings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(patch): Json<SettingsPatch>,
) -> ApiResult<User> {
    let db = state.db()?;
    Ok(data(accounts::update_settings(&db, &user, patch)?))
}

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<AccountDeletion>,
) -> Result<Json<Message>, ServerError> {
    accounts::delete_account(&state, &user, input).await?;
    Ok(message("Account deleted successfully"))
}
