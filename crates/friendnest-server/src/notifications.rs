//! In-app notifications: social-graph events and chat message alerts.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use friendnest_shared::constants::{DEFAULT_MESSAGE_PREVIEW, NOTIFICATION_LIST_LIMIT};
use friendnest_shared::NotificationType;
use friendnest_store::{Database, NewNotification, Notification, User, UserSummary};

use crate::error::{ServerError, StoreResultExt};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<NotificationView>,
    pub unread_count: u64,
}

/// Result of reporting a chat message to its recipient.
#[derive(Debug)]
pub enum MessageNotification {
    /// The recipient has message notifications turned off.
    Disabled,
    /// An unread alert for the same channel was refreshed.
    Updated(Notification),
    Created(Notification),
}

fn enabled_for(recipient: &User, kind: NotificationType) -> bool {
    let toggles = &recipient.settings.notifications;
    match kind {
        NotificationType::FriendRequest => toggles.friend_requests,
        NotificationType::FriendAccepted => toggles.friend_acceptances,
        NotificationType::FriendRemoved => toggles.friend_removals,
        NotificationType::Message => toggles.messages,
    }
}

/// Record a social-graph notification for `recipient` if their settings
/// allow it.  Storage failures are logged; the triggering action has
/// already been committed.
pub fn notify(db: &Database, recipient: &User, kind: NotificationType, message: String, sender_id: Uuid) {
    if !enabled_for(recipient, kind) {
        tracing::debug!(user_id = %recipient.id, kind = kind.as_str(), "notification suppressed by settings");
        return;
    }

    let result = db.insert_notification(&NewNotification {
        user_id: recipient.id,
        kind,
        message,
        sender_id: Some(sender_id),
        channel_id: None,
        metadata: serde_json::Value::Null,
    });
    if let Err(e) = result {
        tracing::warn!(user_id = %recipient.id, kind = kind.as_str(), error = %e, "failed to record notification");
    }
}

/// The newest notifications of `user_id` with their senders.
pub fn list(db: &Database, user_id: Uuid) -> Result<NotificationList, ServerError> {
    let notifications = db.list_notifications(user_id, NOTIFICATION_LIST_LIMIT)?;

    let mut sender_ids: Vec<Uuid> = notifications.iter().filter_map(|n| n.sender_id).collect();
    sender_ids.sort();
    sender_ids.dedup();
    let senders: HashMap<Uuid, UserSummary> = db
        .user_summaries(&sender_ids)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let notifications = notifications
        .into_iter()
        .map(|notification| NotificationView {
            sender: notification
                .sender_id
                .and_then(|id| senders.get(&id).cloned()),
            notification,
        })
        .collect();

    Ok(NotificationList {
        notifications,
        unread_count: db.unread_notification_count(user_id)?,
    })
}

pub fn mark_read(db: &Database, id: Uuid, user_id: Uuid) -> Result<(), ServerError> {
    if db.mark_notification_read(id, user_id)? {
        Ok(())
    } else {
        Err(ServerError::NotFound("Notification not found".into()))
    }
}

pub fn mark_all_read(db: &Database, user_id: Uuid) -> Result<usize, ServerError> {
    Ok(db.mark_all_notifications_read(user_id)?)
}

/// Report a chat message from `sender_id` on `channel_id` to `recipient`.
///
/// While an earlier alert for the same channel is still unread it is
/// refreshed in place instead of stacking a new one.
pub fn create_message_notification(
    db: &Database,
    recipient: &User,
    sender_id: Option<&str>,
    channel_id: Option<&str>,
    message_preview: Option<&str>,
) -> Result<MessageNotification, ServerError> {
    let (Some(sender_id), Some(channel_id)) = (
        sender_id.map(str::trim).filter(|s| !s.is_empty()),
        channel_id.map(str::trim).filter(|s| !s.is_empty()),
    ) else {
        return Err(ServerError::BadRequest("Missing required fields".into()));
    };

    if !recipient.settings.notifications.messages {
        return Ok(MessageNotification::Disabled);
    }

    let preview = message_preview
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_MESSAGE_PREVIEW);
    let metadata = json!({ "messagePreview": preview });

    if let Some(existing) = db.find_unread_message_notification(recipient.id, channel_id)? {
        let updated = db.update_notification_content(existing.id, preview, &metadata)?;
        return Ok(MessageNotification::Updated(updated));
    }

    let sender_id = Uuid::parse_str(sender_id)
        .map_err(|_| ServerError::NotFound("Sender not found".into()))?;
    let sender = db.get_user(sender_id).or_not_found("Sender not found")?;

    let created = db.insert_notification(&NewNotification {
        user_id: recipient.id,
        kind: NotificationType::Message,
        message: format!("{} sent you a message", sender.full_name),
        sender_id: Some(sender.id),
        channel_id: Some(channel_id.to_string()),
        metadata,
    })?;
    Ok(MessageNotification::Created(created))
}
