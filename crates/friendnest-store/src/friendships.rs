//! Read access to the symmetric friendship relation.
//!
//! Edges are stored in both directions; they are written and removed only
//! by the friend-request transactions in [`crate::friend_requests`].

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserSummary;
use crate::sql::parse_uuid;
use crate::users::row_to_summary;

impl Database {
    /// Friend ids of `user_id` in the order the friendships were formed.
    pub fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT friend_id FROM friendships
             WHERE user_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            let id: String = row.get(0)?;
            parse_uuid(0, &id)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                params![a.to_string(), b.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn friend_summaries(&self, user_id: Uuid) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.full_name, u.profile_pic, u.native_language, u.learning_language
             FROM friendships f
             JOIN users u ON u.id = f.friend_id
             WHERE f.user_id = ?1
             ORDER BY f.created_at ASC, f.rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_summary)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn friend_count(&self, user_id: Uuid) -> Result<u32> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?)
    }

    /// Whether `a` and `b` share at least one friend.
    pub fn have_mutual_friend(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM friendships x
                 JOIN friendships y ON y.friend_id = x.friend_id
                 WHERE x.user_id = ?1 AND y.user_id = ?2
                 LIMIT 1",
                params![a.to_string(), b.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
