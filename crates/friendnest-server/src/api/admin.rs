use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::{data, message, path_id, ApiResult, AppState, Message};
use crate::accounts::{AuthSession, LoginInput};
use crate::admin::{self, AdminGroupDetail, Dashboard, GroupList, ListParams, UserDetail, UserList};
use crate::error::ServerError;
use crate::session::AdminUser;

/// Routes behind the admin role check. Login is mounted separately with
/// its own rate limit.
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/groups", get(list_groups))
        .route("/groups/:id", get(get_group).delete(delete_group))
}

pub(super) async fn login(State(state): State<AppState>, Json(input): Json<LoginInput>) -> ApiResult<AuthSession> {
    Ok(data(admin::login(&state, input).await?))
}

async fn dashboard(State(state): State<AppState>, AdminUser(_): AdminUser) -> ApiResult<Dashboard> {
    let db = state.db()?;
    Ok(data(admin::dashboard(&db)?))
}

async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(params): Query<ListParams>,
) -> ApiResult<UserList> {
    let db = state.db()?;
    Ok(data(admin::list_users(&db, &params)?))
}

async fn get_user(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<UserDetail> {
    let id = path_id(&id, "User not found")?;
    let db = state.db()?;
    Ok(data(admin::get_user(&db, id)?))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin_user): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let id = path_id(&id, "User not found")?;
    admin::delete_user(&state, &admin_user, id).await?;
    Ok(message("User deleted successfully"))
}

async fn list_groups(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(params): Query<ListParams>,
) -> ApiResult<GroupList> {
    let db = state.db()?;
    Ok(data(admin::list_groups(&db, &params)?))
}

async fn get_group(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<AdminGroupDetail> {
    let id = path_id(&id, "Group not found")?;
    let db = state.db()?;
    Ok(data(admin::get_group(&db, id)?))
}

async fn delete_group(
    State(state): State<AppState>,
    AdminUser(admin_user): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let id = path_id(&id, "Group not found")?;
    admin::delete_group(&state, &admin_user, id).await?;
    Ok(message("Group deleted successfully"))
}
