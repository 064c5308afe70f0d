//! Aggregate counters for the admin dashboard.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::row_to_event;
use crate::models::{Event, Group, User};
use crate::sql::ts;
use crate::users::USER_COLUMNS;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationCounts {
    pub created_today: u64,
    pub created_this_week: u64,
    pub created_this_month: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: u64,
    pub onboarded: u64,
    pub not_onboarded: u64,
    #[serde(flatten)]
    pub created: CreationCounts,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LanguageCount {
    pub language: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total: u64,
    pub by_language: Vec<LanguageCount>,
    pub total_members: u64,
    #[serde(flatten)]
    pub created: CreationCounts,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventStats {
    pub total: u64,
    pub upcoming: u64,
    pub past: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FriendRequestStats {
    pub total: u64,
    pub pending: u64,
    pub accepted: u64,
    pub removed: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
}

/// Every counter on the dashboard, computed against one `now`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub users: UserStats,
    pub groups: GroupStats,
    pub events: EventStats,
    pub friend_requests: FriendRequestStats,
    pub notifications: NotificationStats,
    /// Friendships among non-admin users, each pair counted once.
    pub friendships: u64,
}

impl Database {
    pub fn dashboard_counts(&self, now: DateTime<Utc>, language_limit: u32) -> Result<DashboardCounts> {
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let non_admin = "role <> 'admin'";

        let users_total = self.count("users", non_admin)?;
        let onboarded = self.count("users", &format!("{non_admin} AND is_onboarded = 1"))?;
        let users_created = CreationCounts {
            created_today: self.count_since("users", non_admin, today)?,
            created_this_week: self.count_since("users", non_admin, week_ago)?,
            created_this_month: self.count_since("users", non_admin, month_ago)?,
        };

        let groups_created = CreationCounts {
            created_today: self.count_since("social_groups", "1 = 1", today)?,
            created_this_week: self.count_since("social_groups", "1 = 1", week_ago)?,
            created_this_month: self.count_since("social_groups", "1 = 1", month_ago)?,
        };

        let upcoming = self.count_events_relative_to(now, true)?;
        let past = self.count_events_relative_to(now, false)?;

        let edges = self.count(
            "friendships",
            "user_id IN (SELECT id FROM users WHERE role <> 'admin')
             AND friend_id IN (SELECT id FROM users WHERE role <> 'admin')",
        )?;

        Ok(DashboardCounts {
            users: UserStats {
                total: users_total,
                onboarded,
                not_onboarded: users_total - onboarded,
                created: users_created,
            },
            groups: GroupStats {
                total: self.count("social_groups", "1 = 1")?,
                by_language: self.groups_by_language(language_limit)?,
                total_members: self.count("group_members", "1 = 1")?,
                created: groups_created,
            },
            events: EventStats {
                total: upcoming + past,
                upcoming,
                past,
            },
            friend_requests: FriendRequestStats {
                total: self.count("friend_requests", "1 = 1")?,
                pending: self.count("friend_requests", "status = 'pending'")?,
                accepted: self.count("friend_requests", "status = 'accepted'")?,
                removed: self.count("friend_requests", "status = 'removed'")?,
            },
            notifications: NotificationStats {
                total: self.count("notifications", "1 = 1")?,
                unread: self.count("notifications", "is_read = 0")?,
            },
            friendships: edges / 2,
        })
    }

    /// Newest non-admin users.
    pub fn recent_users(&self, limit: u32) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE role <> 'admin'
             ORDER BY created_at DESC, rowid DESC
             LIMIT {limit}"
        ))?;
        let rows = stmt.query_map([], crate::users::row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Newest groups.
    pub fn recent_groups(&self, limit: u32) -> Result<Vec<Group>> {
        let mut groups = self.list_groups(&Default::default())?;
        groups.truncate(limit as usize);
        Ok(groups)
    }

    /// Newest events across all groups, paired with their group's name.
    pub fn recent_events(&self, limit: u32) -> Result<Vec<(Event, String)>> {
        let mut events = {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT e.id, e.group_id, e.title, e.description, e.date, e.location,
                        e.organizer_id, e.created_at, e.updated_at, g.name
                 FROM events e
                 JOIN social_groups g ON g.id = e.group_id
                 ORDER BY e.created_at DESC, e.rowid DESC
                 LIMIT {limit}"
            ))?;
            let rows = stmt.query_map([], |row| Ok((row_to_event(row)?, row.get::<_, String>(9)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for (event, _) in &mut events {
            event.attendees = self.event_attendee_ids(event.id)?;
        }
        Ok(events)
    }

    fn groups_by_language(&self, limit: u32) -> Result<Vec<LanguageCount>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT language, COUNT(*) AS n FROM social_groups
             GROUP BY language
             ORDER BY n DESC, language ASC
             LIMIT {limit}"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(LanguageCount {
                language: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    fn count(&self, table: &str, filter: &str) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE {filter}"),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn count_since(&self, table: &str, filter: &str, since: DateTime<Utc>) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE {filter} AND created_at >= ?1"),
            params![ts(&since)],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
