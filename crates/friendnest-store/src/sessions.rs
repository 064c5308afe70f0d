//! Login sessions keyed by the hash of their bearer token.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::User;
use crate::sql::ts;
use crate::users::{row_to_user, USER_COLUMNS};

impl Database {
    pub fn create_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id.to_string(), ts(&Utc::now()), ts(&expires_at)],
        )?;
        Ok(())
    }

    /// The user owning an unexpired session, if any.
    pub fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let columns = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {columns} FROM sessions s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.token_hash = ?1 AND s.expires_at > ?2"
                ),
                params![token_hash, ts(&now)],
                row_to_user,
            )
            .optional()?)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(affected > 0)
    }

    /// Remove every expired session. Returns the number removed.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .conn()
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![ts(&now)])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::users::tests::new_user;

    #[test]
    fn lookup_respects_expiry() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let now = Utc::now();

        db.create_session("live", ana.id, now + Duration::hours(1)).unwrap();
        db.create_session("stale", ana.id, now - Duration::hours(1)).unwrap();

        assert_eq!(db.session_user("live", now).unwrap().unwrap().id, ana.id);
        assert!(db.session_user("stale", now).unwrap().is_none());
        assert!(db.session_user("unknown", now).unwrap().is_none());

        assert_eq!(db.purge_expired_sessions(now).unwrap(), 1);
        assert!(db.delete_session("live").unwrap());
        assert!(db.session_user("live", now).unwrap().is_none());
    }

    #[test]
    fn sessions_die_with_user() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let now = Utc::now();
        db.create_session("tok", ana.id, now + Duration::hours(1)).unwrap();

        db.delete_user(ana.id).unwrap();
        assert!(db.session_user("tok", now).unwrap().is_none());
    }
}
