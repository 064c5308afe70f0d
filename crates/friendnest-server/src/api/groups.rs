use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use friendnest_store::{Event, Group};

use super::{created, data, message, path_id, ApiResult, AppState, Created, Message};
use crate::community::{self, EventInput, GroupCard, GroupDetail, GroupInput, GroupQuery};
use crate::error::ServerError;
use crate::session::AuthUser;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_group).get(list_groups))
        .route("/my-groups", get(my_groups))
        .route("/:id", get(get_group).put(update_group).delete(delete_group))
        .route("/:id/join", post(join_group))
        .route("/:id/leave", post(leave_group))
        .route("/:id/events", post(create_event))
        .route("/:id/events/:event_id/join", post(join_event))
        .route("/:id/events/:event_id/leave", post(leave_event))
        .route("/:id/events/:event_id", delete(delete_event))
}

fn group_id(raw: &str) -> Result<Uuid, ServerError> {
    path_id(raw, "Group not found")
}

fn event_ids((group, event): &(String, String)) -> Result<(Uuid, Uuid), ServerError> {
    Ok((group_id(group)?, path_id(event, "Event not found")?))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

async fn create_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<GroupInput>,
) -> Created<Group> {
    Ok(created(community::create_group(&state, &user, input).await?))
}

async fn list_groups(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Vec<GroupCard>> {
    let db = state.db()?;
    Ok(data(community::list_groups(&db, user.id, query)?))
}

async fn my_groups(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Vec<GroupCard>> {
    let db = state.db()?;
    Ok(data(community::my_groups(&db, user.id)?))
}

async fn get_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<GroupDetail> {
    let id = group_id(&id)?;
    Ok(data(community::get_group(&state, &user, id).await?))
}

async fn update_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<GroupInput>,
) -> ApiResult<GroupDetail> {
    let id = group_id(&id)?;
    Ok(data(community::update_group(&state, &user, id, input).await?))
}

async fn delete_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let id = group_id(&id)?;
    community::delete_group(&state, &user, id).await?;
    Ok(message("Group deleted successfully"))
}

async fn join_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    let id = group_id(&id)?;
    Ok(data(community::join_group(&state, &user, id).await?))
}

async fn leave_group(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let id = group_id(&id)?;
    community::leave_group(&state, &user, id).await?;
    Ok(message("Successfully left group"))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

async fn create_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<EventInput>,
) -> Created<Event> {
    let id = group_id(&id)?;
    let db = state.db()?;
    Ok(created(community::create_event(&db, &user, id, input)?))
}

async fn join_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(ids): Path<(String, String)>,
) -> ApiResult<Event> {
    let (group_id, event_id) = event_ids(&ids)?;
    let db = state.db()?;
    Ok(data(community::join_event(&db, &user, group_id, event_id)?))
}

async fn leave_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(ids): Path<(String, String)>,
) -> Result<Json<Message>, ServerError> {
    let (group_id, event_id) = event_ids(&ids)?;
    community::leave_event(&*state.db()?, &user, group_id, event_id)?;
    Ok(message("Successfully left event"))
}

async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(ids): Path<(String, String)>,
) -> Result<Json<Message>, ServerError> {
    let (group_id, event_id) = event_ids(&ids)?;
    community::delete_event(&*state.db()?, &user, group_id, event_id)?;
    Ok(message("Event deleted successfully"))
}
