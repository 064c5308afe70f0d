//! CRUD operations for [`Group`] records and their member lists.

use chrono::Utc;
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{AdminGroupQuery, Group, GroupFilter, GroupUpdate, NewGroup, Page};
use crate::sql::{like_pattern, parse_ts, parse_uuid, ts};

const GROUP_COLUMNS: &str = "id, name, description, language, cover_image, creator_id, \
     stream_channel_id, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a group with its creator as the first member.
    pub fn create_group(&self, new: &NewGroup) -> Result<Group> {
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            description: new.description.clone(),
            language: new.language.clone(),
            cover_image: new.cover_image.clone(),
            creator_id: new.creator_id,
            stream_channel_id: String::new(),
            members: vec![new.creator_id],
            created_at: now,
            updated_at: now,
        };

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO social_groups ({GROUP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                group.id.to_string(),
                group.name,
                group.description,
                group.language,
                group.cover_image,
                group.creator_id.to_string(),
                group.stream_channel_id,
                ts(&now),
                ts(&now),
            ],
        )?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![group.id.to_string(), group.creator_id.to_string(), ts(&now)],
        )?;
        tx.commit()?;

        tracing::debug!(group_id = %group.id, creator_id = %group.creator_id, "group created");
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_group(&self, id: Uuid) -> Result<Group> {
        let mut group = self.conn().query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM social_groups WHERE id = ?1"),
            params![id.to_string()],
            row_to_group,
        )?;
        group.members = self.group_member_ids(id)?;
        Ok(group)
    }

    /// Member ids in join order.
    pub fn group_member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![group_id.to_string()], |row| {
            let id: String = row.get(0)?;
            parse_uuid(0, &id)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// All groups matching `filter`, newest first.
    pub fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>> {
        let (clause, args) = group_filter_clause(filter);
        self.load_groups(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM social_groups{clause}
                 ORDER BY created_at DESC, rowid DESC"
            ),
            &args,
        )
    }

    /// Groups `user_id` belongs to, most recently updated first.
    pub fn groups_for_member(&self, user_id: Uuid) -> Result<Vec<Group>> {
        self.load_groups(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM social_groups
                 WHERE id IN (SELECT group_id FROM group_members WHERE user_id = ?1)
                 ORDER BY updated_at DESC, rowid DESC"
            ),
            &[user_id.to_string()],
        )
    }

    /// Groups created by `user_id`, newest first.
    pub fn groups_created_by(&self, user_id: Uuid) -> Result<Vec<Group>> {
        self.load_groups(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM social_groups
                 WHERE creator_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            &[user_id.to_string()],
        )
    }

    /// Paginated admin listing.
    pub fn list_groups_admin(&self, query: &AdminGroupQuery) -> Result<Page<Group>> {
        let (clause, args) = group_filter_clause(&query.filter);

        let total: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM social_groups{clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let direction = if query.ascending { "ASC" } else { "DESC" };
        let items = self.load_groups(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM social_groups{clause}
                 ORDER BY {} {direction}, rowid {direction}
                 LIMIT {} OFFSET {}",
                query.sort.column(),
                query.limit,
                query.offset
            ),
            &args,
        )?;

        Ok(Page {
            items,
            total: total as u64,
        })
    }

    pub fn count_group_events(&self, group_id: Uuid) -> Result<u32> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE group_id = ?1",
            params![group_id.to_string()],
            |row| row.get(0),
        )?)
    }

    fn load_groups(&self, sql: &str, args: &[String]) -> Result<Vec<Group>> {
        let mut groups = {
            let mut stmt = self.conn().prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), row_to_group)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for group in &mut groups {
            group.members = self.group_member_ids(group.id)?;
        }
        Ok(groups)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Append `user_id` to the member list. A duplicate membership is a
    /// [`StoreError::Conflict`].
    pub fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let now = ts(&Utc::now());
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![group_id.to_string(), user_id.to_string(), now],
        )?;
        tx.execute(
            "UPDATE social_groups SET updated_at = ?2 WHERE id = ?1",
            params![group_id.to_string(), now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns `true` if a membership was removed.
    pub fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let now = ts(&Utc::now());
        let tx = self.conn().unchecked_transaction()?;
        let affected = tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
        )?;
        if affected > 0 {
            tx.execute(
                "UPDATE social_groups SET updated_at = ?2 WHERE id = ?1",
                params![group_id.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(affected > 0)
    }

    pub fn update_group(&self, id: Uuid, update: &GroupUpdate) -> Result<Group> {
        let affected = self.conn().execute(
            "UPDATE social_groups SET
                name        = COALESCE(?2, name),
                description = COALESCE(?3, description),
                language    = COALESCE(?4, language),
                cover_image = COALESCE(?5, cover_image),
                updated_at  = ?6
             WHERE id = ?1",
            params![
                id.to_string(),
                update.name,
                update.description,
                update.language,
                update.cover_image,
                ts(&Utc::now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_group(id)
    }

    pub fn set_stream_channel_id(&self, id: Uuid, channel_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE social_groups SET stream_channel_id = ?2 WHERE id = ?1",
            params![id.to_string(), channel_id],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a group; members, events and RSVPs cascade. Returns `true` if
    /// a row was deleted.
    pub fn delete_group(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM social_groups WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn group_filter_clause(filter: &GroupFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(language) = &filter.language {
        args.push(language.to_lowercase());
        conditions.push(format!("fold(language) = ?{}", args.len()));
    }
    if let Some(search) = &filter.search {
        args.push(like_pattern(search));
        let n = args.len();
        conditions.push(format!(
            "(fold(name) LIKE ?{n} ESCAPE '\\' OR fold(description) LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

/// Map a row selected with `GROUP_COLUMNS`. Members are filled in by the
/// caller.
fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id: String = row.get(0)?;
    let creator: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Group {
        id: parse_uuid(0, &id)?,
        name: row.get(1)?,
        description: row.get(2)?,
        language: row.get(3)?,
        cover_image: row.get(4)?,
        creator_id: parse_uuid(5, &creator)?,
        stream_channel_id: row.get(6)?,
        members: Vec::new(),
        created_at: parse_ts(7, &created_at)?,
        updated_at: parse_ts(8, &updated_at)?,
    })
}
