//! CRUD operations for [`Notification`] records.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewNotification, Notification};
use crate::sql::{parse_enum, parse_json, parse_ts, parse_uuid, ts};

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, message, sender_id, channel_id, is_read, \
     metadata, created_at, updated_at";

impl Database {
    pub fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            kind: new.kind,
            message: new.message.clone(),
            sender_id: new.sender_id,
            channel_id: new.channel_id.clone(),
            is_read: false,
            metadata: new.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            &format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.kind.as_str(),
                notification.message,
                notification.sender_id.map(|id| id.to_string()),
                notification.channel_id,
                notification.is_read,
                serde_json::to_string(&notification.metadata)?,
                ts(&now),
                ts(&now),
            ],
        )?;

        Ok(notification)
    }

    /// The newest `limit` notifications of `user_id`.
    pub fn list_notifications(&self, user_id: Uuid, limit: u32) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT {limit}"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_notification)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Mark one notification read. Returns `false` when no notification with
    /// that id belongs to `user_id`.
    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1, updated_at = ?3
             WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id.to_string(), ts(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    /// Returns the number of notifications that changed.
    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE notifications SET is_read = 1, updated_at = ?2
             WHERE user_id = ?1 AND is_read = 0",
            params![user_id.to_string(), ts(&Utc::now())],
        )?)
    }

    /// The unread `message` notification for `channel_id`, if any.
    pub fn find_unread_message_notification(
        &self,
        user_id: Uuid,
        channel_id: &str,
    ) -> Result<Option<Notification>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE user_id = ?1 AND type = 'message' AND channel_id = ?2 AND is_read = 0
                     ORDER BY created_at DESC
                     LIMIT 1"
                ),
                params![user_id.to_string(), channel_id],
                row_to_notification,
            )
            .optional()?)
    }

    /// Replace the text and metadata of an existing notification.
    pub fn update_notification_content(
        &self,
        id: Uuid,
        message: &str,
        metadata: &serde_json::Value,
    ) -> Result<Notification> {
        let affected = self.conn().execute(
            "UPDATE notifications SET message = ?2, metadata = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                message,
                serde_json::to_string(metadata)?,
                ts(&Utc::now())
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(self.conn().query_row(
            &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
            params![id.to_string()],
            row_to_notification,
        )?)
    }

    /// `(total, unread)` notification counts for one user.
    pub fn notification_counts(&self, user_id: Uuid) -> Result<(u64, u64)> {
        let (total, unread): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END), 0)
             FROM notifications WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as u64, unread as u64))
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let sender_id: Option<String> = row.get(4)?;
    let metadata: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Notification {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        kind: parse_enum(2, &kind)?,
        message: row.get(3)?,
        sender_id: sender_id.as_deref().map(|s| parse_uuid(4, s)).transpose()?,
        channel_id: row.get(5)?,
        is_read: row.get(6)?,
        metadata: parse_json(7, &metadata)?,
        created_at: parse_ts(8, &created_at)?,
        updated_at: parse_ts(9, &updated_at)?,
    })
}
