//! Friend request records and the transactions that move the friendship
//! graph.
//!
//! Every mutation that touches both `friend_requests` and `friendships` runs
//! inside a single SQLite transaction so the symmetric-edge invariant holds
//! even if the process dies mid-way.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use friendnest_shared::FriendRequestStatus;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::FriendRequest;
use crate::sql::{parse_enum, parse_ts, parse_uuid, ts};

const REQUEST_COLUMNS: &str = "id, sender_id, recipient_id, status, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get_friend_request(&self, id: Uuid) -> Result<FriendRequest> {
        Ok(self.conn().query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1"),
            params![id.to_string()],
            row_to_request,
        )?)
    }

    /// The pending or accepted request between `a` and `b`, in either
    /// direction.
    pub fn find_active_request_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM friend_requests
                     WHERE ((sender_id = ?1 AND recipient_id = ?2)
                         OR (sender_id = ?2 AND recipient_id = ?1))
                       AND status IN ('pending', 'accepted')
                     LIMIT 1"
                ),
                params![a.to_string(), b.to_string()],
                row_to_request,
            )
            .optional()?)
    }

    /// Pending requests addressed to `user_id`, newest first.
    pub fn incoming_pending_requests(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            "recipient_id = ?1 AND status = 'pending'",
            "created_at DESC",
            user_id,
            None,
        )
    }

    /// Pending requests sent by `user_id`, newest first.
    pub fn outgoing_pending_requests(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            "sender_id = ?1 AND status = 'pending'",
            "created_at DESC",
            user_id,
            None,
        )
    }

    /// Accepted requests `user_id` sent, most recently updated first.
    pub fn accepted_requests_as_sender(&self, user_id: Uuid, limit: u32) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            "sender_id = ?1 AND status = 'accepted'",
            "updated_at DESC",
            user_id,
            Some(limit),
        )
    }

    /// Accepted requests `user_id` received, most recently updated first.
    pub fn accepted_requests_as_recipient(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            "recipient_id = ?1 AND status = 'accepted'",
            "updated_at DESC",
            user_id,
            Some(limit),
        )
    }

    /// `removed` records naming `user_id` as the removed party, newest first.
    pub fn removed_requests_for_recipient(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            "recipient_id = ?1 AND status = 'removed'",
            "created_at DESC",
            user_id,
            Some(limit),
        )
    }

    /// Every request `user_id` sent, newest first.
    pub fn requests_sent_by(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.query_requests("sender_id = ?1", "created_at DESC", user_id, None)
    }

    /// Every request addressed to `user_id`, newest first.
    pub fn requests_received_by(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.query_requests("recipient_id = ?1", "created_at DESC", user_id, None)
    }

    /// All requests between `a` and `b` regardless of status.
    pub fn requests_between(&self, a: Uuid, b: Uuid) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_request)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    fn query_requests(
        &self,
        filter: &str,
        order: &str,
        user_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<FriendRequest>> {
        let mut sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE {filter} ORDER BY {order}, rowid DESC"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_request)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Create a `pending` request from `sender_id` to `recipient_id`.
    ///
    /// Stale `removed` records for the pair are purged in the same
    /// transaction. An active request in either direction makes the insert
    /// fail with [`StoreError::Conflict`].
    pub fn create_friend_request(&self, sender_id: Uuid, recipient_id: Uuid) -> Result<FriendRequest> {
        let now = Utc::now();
        let request = FriendRequest {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            status: FriendRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM friend_requests
             WHERE ((sender_id = ?1 AND recipient_id = ?2)
                 OR (sender_id = ?2 AND recipient_id = ?1))
               AND status = 'removed'",
            params![sender_id.to_string(), recipient_id.to_string()],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO friend_requests ({REQUEST_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                request.id.to_string(),
                sender_id.to_string(),
                recipient_id.to_string(),
                request.status.as_str(),
                ts(&now),
                ts(&now),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(request_id = %request.id, %sender_id, %recipient_id, "friend request created");
        Ok(request)
    }

    /// Mark a pending request `accepted` and add both friendship edges.
    ///
    /// Returns [`StoreError::NotFound`] if the request is missing and
    /// [`StoreError::Conflict`] if it is no longer pending.
    pub fn accept_friend_request(&self, request_id: Uuid) -> Result<FriendRequest> {
        let now = ts(&Utc::now());

        let tx = self.conn().unchecked_transaction()?;
        let request = tx.query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1"),
            params![request_id.to_string()],
            row_to_request,
        )?;
        if request.status != FriendRequestStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "friend request is {}",
                request.status
            )));
        }

        tx.execute(
            "UPDATE friend_requests SET status = 'accepted', updated_at = ?2 WHERE id = ?1",
            params![request_id.to_string(), now],
        )?;
        let (a, b) = (request.sender_id.to_string(), request.recipient_id.to_string());
        tx.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
             VALUES (?1, ?2, ?3), (?2, ?1, ?3)",
            params![a, b, now],
        )?;
        tx.commit()?;

        tracing::debug!(%request_id, "friend request accepted");
        self.get_friend_request(request_id)
    }

    /// Dissolve the friendship between `remover_id` and `removed_id`.
    ///
    /// Deletes both edges and every request between the pair, then leaves a
    /// single `removed` record addressed to the removed party.
    pub fn dissolve_friendship(&self, remover_id: Uuid, removed_id: Uuid) -> Result<FriendRequest> {
        let now = Utc::now();
        let record = FriendRequest {
            id: Uuid::new_v4(),
            sender_id: remover_id,
            recipient_id: removed_id,
            status: FriendRequestStatus::Removed,
            created_at: now,
            updated_at: now,
        };
        let (a, b) = (remover_id.to_string(), removed_id.to_string());

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![a, b],
        )?;
        tx.execute(
            "DELETE FROM friend_requests
             WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1)",
            params![a, b],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO friend_requests ({REQUEST_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                record.id.to_string(),
                a,
                b,
                record.status.as_str(),
                ts(&now),
                ts(&now),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(%remover_id, %removed_id, "friendship dissolved");
        Ok(record)
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let id: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let recipient: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(FriendRequest {
        id: parse_uuid(0, &id)?,
        sender_id: parse_uuid(1, &sender)?,
        recipient_id: parse_uuid(2, &recipient)?,
        status: parse_enum(3, &status)?,
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::new_user;

    #[test]
    fn second_active_request_is_conflict_in_either_direction() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");

        db.create_friend_request(a.id, b.id).unwrap();

        assert!(matches!(
            db.create_friend_request(a.id, b.id),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.create_friend_request(b.id, a.id),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn accept_requires_pending() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");

        let req = db.create_friend_request(a.id, b.id).unwrap();
        let accepted = db.accept_friend_request(req.id).unwrap();
        assert_eq!(accepted.status, FriendRequestStatus::Accepted);
        assert!(accepted.updated_at >= req.updated_at);

        assert!(matches!(
            db.accept_friend_request(req.id),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.accept_friend_request(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn dissolve_leaves_single_removed_record() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");

        let req = db.create_friend_request(a.id, b.id).unwrap();
        db.accept_friend_request(req.id).unwrap();
        db.dissolve_friendship(a.id, b.id).unwrap();

        assert!(!db.are_friends(a.id, b.id).unwrap());
        assert!(!db.are_friends(b.id, a.id).unwrap());

        let between = db.requests_between(a.id, b.id).unwrap();
        assert_eq!(between.len(), 1);
        assert_eq!(between[0].status, FriendRequestStatus::Removed);
        assert_eq!(between[0].sender_id, a.id);
        assert_eq!(between[0].recipient_id, b.id);

        let removed = db.removed_requests_for_recipient(b.id, 10).unwrap();
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn new_request_purges_removed_records() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");

        let req = db.create_friend_request(a.id, b.id).unwrap();
        db.accept_friend_request(req.id).unwrap();
        db.dissolve_friendship(a.id, b.id).unwrap();

        let again = db.create_friend_request(b.id, a.id).unwrap();
        let between = db.requests_between(a.id, b.id).unwrap();
        assert_eq!(between, vec![again]);
    }

    #[test]
    fn pending_listings_by_direction() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");
        let c = new_user(&db, "Cleo");

        db.create_friend_request(a.id, b.id).unwrap();
        db.create_friend_request(c.id, b.id).unwrap();

        assert_eq!(db.incoming_pending_requests(b.id).unwrap().len(), 2);
        assert_eq!(db.outgoing_pending_requests(a.id).unwrap().len(), 1);
        assert!(db.incoming_pending_requests(a.id).unwrap().is_empty());
        assert_eq!(db.requests_sent_by(c.id).unwrap().len(), 1);
        assert_eq!(db.requests_received_by(b.id).unwrap().len(), 2);
    }

    #[test]
    fn accepted_listings_respect_limit() {
        let db = Database::open_in_memory().unwrap();
        let hub = new_user(&db, "Hub");
        for i in 0..3 {
            let other = new_user(&db, &format!("Friend{i}"));
            let req = db.create_friend_request(hub.id, other.id).unwrap();
            db.accept_friend_request(req.id).unwrap();
        }

        assert_eq!(db.accepted_requests_as_sender(hub.id, 2).unwrap().len(), 2);
        assert!(db.accepted_requests_as_recipient(hub.id, 10).unwrap().is_empty());
    }
}
