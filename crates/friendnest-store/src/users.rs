//! CRUD operations for [`User`] records.

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension};
use uuid::Uuid;

use friendnest_shared::{Role, UserSettings, UserSort};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    AdminUserQuery, NewUser, Page, ProfileUpdate, User, UserSearch, UserSummary, UserWithCounts,
};
use crate::sql::{like_pattern, parse_enum, parse_json, parse_ts, parse_uuid, placeholders, ts};

pub(crate) const USER_COLUMNS: &str = "id, full_name, email, password_hash, bio, profile_pic, \
     native_language, learning_language, location, is_onboarded, role, settings, \
     created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. Fails with [`StoreError::Conflict`] when the email
    /// is already registered.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: new.full_name.clone(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            bio: String::new(),
            profile_pic: new.profile_pic.clone(),
            native_language: String::new(),
            learning_language: String::new(),
            location: String::new(),
            is_onboarded: false,
            role: new.role,
            settings: UserSettings::default(),
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            &format!(
                "INSERT INTO users ({USER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                user.id.to_string(),
                user.full_name,
                user.email,
                user.password_hash,
                user.bio,
                user.profile_pic,
                user.native_language,
                user.learning_language,
                user.location,
                user.is_onboarded,
                user.role.as_str(),
                serde_json::to_string(&user.settings)?,
                ts(&user.created_at),
                ts(&user.updated_at),
            ],
        )?;

        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        Ok(self.conn().query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )?)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    pub fn user_exists(&self, id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Summaries for the given ids, in the same order. Unknown ids are
    /// skipped.
    pub fn user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, full_name, profile_pic, native_language, learning_language
             FROM users WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(ids.iter().map(|id| id.to_string())),
            row_to_summary,
        )?;

        let mut found = Vec::with_capacity(ids.len());
        for row in rows {
            found.push(row?);
        }

        Ok(ids
            .iter()
            .filter_map(|id| found.iter().find(|s| s.id == *id).cloned())
            .collect())
    }

    pub fn user_summary(&self, id: Uuid) -> Result<UserSummary> {
        self.user_summaries(&[id])?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    /// Onboarded users who are neither `user_id` nor one of their friends.
    pub fn recommended_users(&self, user_id: Uuid) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE id <> ?1
               AND is_onboarded = 1
               AND id NOT IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
             ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Directory search over onboarded users other than `exclude`. Friends
    /// are included.
    pub fn search_users(&self, exclude: Uuid, search: &UserSearch) -> Result<Vec<User>> {
        let mut sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id <> ?1 AND is_onboarded = 1"
        );
        let mut args = vec![exclude.to_string()];

        if let Some(query) = &search.query {
            args.push(like_pattern(query));
            let n = args.len();
            sql.push_str(&format!(
                " AND (fold(full_name) LIKE ?{n} ESCAPE '\\' \
                 OR fold(location) LIKE ?{n} ESCAPE '\\' OR fold(bio) LIKE ?{n} ESCAPE '\\')"
            ));
        }
        for (column, value) in [
            ("native_language", &search.native_language),
            ("learning_language", &search.learning_language),
            ("location", &search.location),
        ] {
            if let Some(value) = value {
                args.push(like_pattern(value));
                sql.push_str(&format!(" AND fold({column}) LIKE ?{} ESCAPE '\\'", args.len()));
            }
        }

        let order = match search.sort {
            UserSort::RecentlyActive => "updated_at DESC",
            UserSort::NewUsers => "created_at DESC",
            UserSort::Location => "fold(location) ASC",
            UserSort::Name => "fold(full_name) ASC",
        };
        sql.push_str(&format!(" ORDER BY {order} LIMIT {}", search.limit));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Paginated admin listing of regular users, with friend and group
    /// counts.
    pub fn list_users_admin(&self, query: &AdminUserQuery) -> Result<Page<UserWithCounts>> {
        let mut filter = String::from(" WHERE role <> 'admin'");
        let mut args: Vec<String> = Vec::new();

        if let Some(search) = &query.search {
            args.push(like_pattern(search));
            let n = args.len();
            filter.push_str(&format!(
                " AND (fold(full_name) LIKE ?{n} ESCAPE '\\' OR fold(email) LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(onboarded) = query.onboarded {
            filter.push_str(if onboarded {
                " AND is_onboarded = 1"
            } else {
                " AND is_onboarded = 0"
            });
        }

        let total: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM users{filter}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let direction = if query.ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {USER_COLUMNS},
                    (SELECT COUNT(*) FROM friendships f WHERE f.user_id = users.id),
                    (SELECT COUNT(*) FROM group_members m WHERE m.user_id = users.id)
             FROM users{filter}
             ORDER BY {} {direction}
             LIMIT {} OFFSET {}",
            query.sort.column(),
            query.limit,
            query.offset
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(UserWithCounts {
                user: row_to_user(row)?,
                friends_count: row.get(14)?,
                groups_count: row.get(15)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        Ok(Page {
            items,
            total: total as u64,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET
                full_name         = COALESCE(?2, full_name),
                bio               = COALESCE(?3, bio),
                native_language   = COALESCE(?4, native_language),
                learning_language = COALESCE(?5, learning_language),
                location          = COALESCE(?6, location),
                profile_pic       = COALESCE(?7, profile_pic),
                is_onboarded      = COALESCE(?8, is_onboarded),
                updated_at        = ?9
             WHERE id = ?1",
            params![
                id.to_string(),
                update.full_name,
                update.bio,
                update.native_language,
                update.learning_language,
                update.location,
                update.profile_pic,
                update.is_onboarded,
                ts(&Utc::now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    pub fn update_email(&self, id: Uuid, email: &str) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET email = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), email, ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    pub fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), password_hash, ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn update_settings(&self, id: Uuid, settings: &UserSettings) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET settings = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), serde_json::to_string(settings)?, ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    pub fn set_role(&self, id: Uuid, role: Role) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), role.as_str(), ts(&Utc::now())],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user.  Friendship edges, friend requests, notifications,
    /// sessions, memberships, RSVPs, created groups and organized events go
    /// with it (ON DELETE CASCADE).  Returns `true` if a row was deleted.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a row selected with [`USER_COLUMNS`] to a [`User`].
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let role: String = row.get(10)?;
    let settings: String = row.get(11)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    Ok(User {
        id: parse_uuid(0, &id)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        bio: row.get(4)?,
        profile_pic: row.get(5)?,
        native_language: row.get(6)?,
        learning_language: row.get(7)?,
        location: row.get(8)?,
        is_onboarded: row.get(9)?,
        role: parse_enum(10, &role)?,
        settings: parse_json(11, &settings)?,
        created_at: parse_ts(12, &created_at)?,
        updated_at: parse_ts(13, &updated_at)?,
    })
}

/// Map `id, full_name, profile_pic, native_language, learning_language`.
pub(crate) fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSummary> {
    let id: String = row.get(0)?;
    Ok(UserSummary {
        id: parse_uuid(0, &id)?,
        full_name: row.get(1)?,
        profile_pic: row.get(2)?,
        native_language: row.get(3)?,
        learning_language: row.get(4)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_user(db: &Database, name: &str) -> User {
        db.create_user(&NewUser {
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "hash".to_string(),
            profile_pic: String::new(),
            role: Role::User,
        })
        .unwrap()
    }

    pub(crate) fn onboarded_user(db: &Database, name: &str) -> User {
        let user = new_user(db, name);
        db.update_profile(
            user.id,
            &ProfileUpdate {
                is_onboarded: Some(true),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");

        let loaded = db.get_user(ana.id).unwrap();
        assert_eq!(loaded.email, "ana@example.com");
        assert_eq!(loaded.role, Role::User);
        assert!(!loaded.is_onboarded);
        assert!(loaded.settings.notifications.messages);
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        new_user(&db, "Ana");
        let err = db
            .create_user(&NewUser {
                full_name: "Other".into(),
                email: "ana@example.com".into(),
                password_hash: "x".into(),
                profile_pic: String::new(),
                role: Role::User,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_user(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
        assert!(db.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn update_profile_keeps_unset_fields() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");

        db.update_profile(
            ana.id,
            &ProfileUpdate {
                bio: Some("Hola".into()),
                native_language: Some("spanish".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let updated = db
            .update_profile(
                ana.id,
                &ProfileUpdate {
                    location: Some("Madrid".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.full_name, "Ana");
        assert_eq!(updated.bio, "Hola");
        assert_eq!(updated.native_language, "spanish");
        assert_eq!(updated.location, "Madrid");
    }

    #[test]
    fn summaries_preserve_order_and_skip_unknown() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ana");
        let b = new_user(&db, "Ben");

        let summaries = db.user_summaries(&[b.id, Uuid::new_v4(), a.id]).unwrap();
        let names: Vec<_> = summaries.iter().map(|s| s.full_name.as_str()).collect();
        assert_eq!(names, vec!["Ben", "Ana"]);
    }

    #[test]
    fn search_filters_and_excludes_caller() {
        let db = Database::open_in_memory().unwrap();
        let me = onboarded_user(&db, "Me");
        let ana = onboarded_user(&db, "Ana");
        db.update_profile(
            ana.id,
            &ProfileUpdate {
                native_language: Some("Spanish".into()),
                location: Some("Madrid".into()),
                ..Default::default()
            },
        )
        .unwrap();
        onboarded_user(&db, "Ben");
        new_user(&db, "Anabel"); // not onboarded

        let found = db
            .search_users(
                me.id,
                &UserSearch {
                    query: Some("ana".into()),
                    limit: 50,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ana.id);

        let by_language = db
            .search_users(
                me.id,
                &UserSearch {
                    native_language: Some("span".into()),
                    limit: 50,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_language.len(), 1);

        let by_name = db
            .search_users(
                me.id,
                &UserSearch {
                    sort: UserSort::Name,
                    limit: 50,
                    ..Default::default()
                },
            )
            .unwrap();
        let names: Vec<_> = by_name.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben"]);
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let db = Database::open_in_memory().unwrap();
        let me = onboarded_user(&db, "Me");
        let elodie = onboarded_user(&db, "Élodie");
        db.update_profile(
            elodie.id,
            &ProfileUpdate {
                native_language: Some("Español".into()),
                location: Some("Göteborg".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let search = |filter: UserSearch| {
            db.search_users(me.id, &UserSearch { limit: 50, ..filter })
                .unwrap()
                .into_iter()
                .map(|u| u.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            search(UserSearch {
                query: Some("élodie".into()),
                ..Default::default()
            }),
            vec![elodie.id]
        );
        assert_eq!(
            search(UserSearch {
                native_language: Some("ESPAÑOL".into()),
                ..Default::default()
            }),
            vec![elodie.id]
        );
        assert_eq!(
            search(UserSearch {
                location: Some("GÖTE".into()),
                ..Default::default()
            }),
            vec![elodie.id]
        );

        let listed = db
            .list_users_admin(&AdminUserQuery {
                search: Some("ÉLO".into()),
                limit: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].user.id, elodie.id);
    }

    #[test]
    fn admin_listing_excludes_admins_and_paginates() {
        let db = Database::open_in_memory().unwrap();
        for name in ["Ana", "Ben", "Cleo"] {
            new_user(&db, name);
        }
        let admin = new_user(&db, "Root");
        db.set_role(admin.id, Role::Admin).unwrap();

        let page = db
            .list_users_admin(&AdminUserQuery {
                limit: 2,
                offset: 0,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|u| u.user.role == Role::User));
    }
}
