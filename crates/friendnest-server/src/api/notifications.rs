use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use friendnest_store::Notification;

use super::{data, message, path_id, ApiResult, AppState, Message};
use crate::error::ServerError;
use crate::notifications::{self, MessageNotification, NotificationList};
use crate::session::AuthUser;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/message", post(create_message_notification))
        .route("/read-all", put(mark_all_read))
        .route("/:id/read", put(mark_read))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<NotificationList> {
    let db = state.db()?;
    Ok(data(notifications::list(&db, user.id)?))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, ServerError> {
    let id = path_id(&id, "Notification not found")?;
    notifications::mark_read(&*state.db()?, id, user.id)?;
    Ok(message("Notification marked as read"))
}

async fn mark_all_read(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Message>, ServerError> {
    notifications::mark_all_read(&*state.db()?, user.id)?;
    Ok(message("All notifications marked as read"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MessageAlert {
    sender_id: Option<String>,
    channel_id: Option<String>,
    message_preview: Option<String>,
}

#[derive(Serialize)]
struct MessageAlertResponse {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Notification>,
}

/// Reported by the recipient's client when a chat message arrives.
async fn create_message_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(alert): Json<MessageAlert>,
) -> Result<Response, ServerError> {
    let outcome = notifications::create_message_notification(
        &*state.db()?,
        &user,
        alert.sender_id.as_deref(),
        alert.channel_id.as_deref(),
        alert.message_preview.as_deref(),
    )?;

    let (status, message, notification) = match outcome {
        MessageNotification::Disabled => (StatusCode::OK, "Notifications disabled", None),
        MessageNotification::Updated(n) => (StatusCode::OK, "Notification updated", Some(n)),
        MessageNotification::Created(n) => (StatusCode::CREATED, "Notification created", Some(n)),
    };
    let body = MessageAlertResponse {
        success: true,
        message,
        data: notification,
    };
    Ok((status, Json(body)).into_response())
}
