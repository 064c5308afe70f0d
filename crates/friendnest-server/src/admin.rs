//! Administrator back-office: dashboard, user and group management.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use friendnest_shared::constants::{
    DEFAULT_PAGE_SIZE, LANGUAGE_BREAKDOWN_LIMIT, MAX_PAGE_SIZE, RECENT_ACTIVITY_LIMIT,
};
use friendnest_shared::validation::non_blank;
use friendnest_store::{
    AdminGroupQuery, AdminUserQuery, DashboardCounts, Database, Event, Group, GroupFilter,
    GroupSortColumn, User, UserSortColumn, UserSummary, UserWithCounts,
};

use crate::accounts::{self, AuthSession, LoginInput};
use crate::api::AppState;
use crate::community;
use crate::error::{ServerError, StoreResultExt};
use crate::session::issue_session;
use crate::social::{with_recipients, with_senders, RequestWithRecipient, RequestWithSender};

const USER_NOT_FOUND: &str = "User not found";
const GROUP_NOT_FOUND: &str = "Group not found";

// ---------------------------------------------------------------------------
// Listing parameters
// ---------------------------------------------------------------------------

/// Query string of the admin listings. Numbers are parsed leniently: a
/// missing or malformed value falls back to the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub onboarded: Option<String>,
    pub language: Option<String>,
}

impl ListParams {
    fn positive(value: Option<&str>) -> Option<u32> {
        value
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
    }

    pub fn page(&self) -> u32 {
        Self::positive(self.page.as_deref()).unwrap_or(1)
    }

    pub fn limit(&self) -> u32 {
        Self::positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    fn ascending(&self) -> bool {
        self.order.as_deref() == Some("asc")
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    fn new(params: &ListParams, total: u64) -> Self {
        let limit = params.limit();
        Self {
            page: params.page(),
            limit,
            total,
            pages: total.div_ceil(u64::from(limit)),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroup {
    #[serde(flatten)]
    pub group: Group,
    pub creator: Option<UserSummary>,
    pub member_count: usize,
    pub event_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    #[serde(flatten)]
    pub event: Event,
    pub group_name: String,
}

#[derive(Debug, Serialize)]
pub struct RecentActivity {
    pub users: Vec<User>,
    pub groups: Vec<AdminGroup>,
    pub events: Vec<RecentEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(flatten)]
    pub counts: DashboardCounts,
    pub recent_activity: RecentActivity,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<UserWithCounts>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct GroupList {
    pub groups: Vec<AdminGroup>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub friends: Vec<UserSummary>,
    pub groups: Vec<AdminGroup>,
    pub friend_requests_sent: Vec<RequestWithRecipient>,
    pub friend_requests_received: Vec<RequestWithSender>,
    pub notification_count: u64,
    pub unread_notification_count: u64,
}

fn admin_groups(db: &Database, groups: Vec<Group>) -> Result<Vec<AdminGroup>, ServerError> {
    let mut creator_ids: Vec<Uuid> = groups.iter().map(|g| g.creator_id).collect();
    creator_ids.sort();
    creator_ids.dedup();
    let creators: HashMap<Uuid, UserSummary> = db
        .user_summaries(&creator_ids)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    groups
        .into_iter()
        .map(|group| {
            Ok(AdminGroup {
                creator: creators.get(&group.creator_id).cloned(),
                member_count: group.members.len(),
                event_count: db.count_group_events(group.id)?,
                group,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Password login restricted to administrators.
pub async fn login(state: &AppState, input: LoginInput) -> Result<AuthSession, ServerError> {
    let user = accounts::authenticate(state, input).await?;
    if !user.role.is_admin() {
        tracing::warn!(user_id = %user.id, "non-admin attempted admin login");
        return Err(ServerError::Forbidden(
            "Access denied. Admin privileges required.".into(),
        ));
    }
    let token = issue_session(&*state.db()?, user.id, state.config.session_ttl_hours)?;
    tracing::info!(user_id = %user.id, "admin logged in");
    Ok(AuthSession { user, token })
}

pub fn dashboard(db: &Database) -> Result<Dashboard, ServerError> {
    let counts = db.dashboard_counts(Utc::now(), LANGUAGE_BREAKDOWN_LIMIT)?;
    let recent_activity = RecentActivity {
        users: db.recent_users(RECENT_ACTIVITY_LIMIT)?,
        groups: admin_groups(db, db.recent_groups(RECENT_ACTIVITY_LIMIT)?)?,
        events: db
            .recent_events(RECENT_ACTIVITY_LIMIT)?
            .into_iter()
            .map(|(event, group_name)| RecentEvent { event, group_name })
            .collect(),
    };
    Ok(Dashboard {
        counts,
        recent_activity,
    })
}

pub fn list_users(db: &Database, params: &ListParams) -> Result<UserList, ServerError> {
    let query = AdminUserQuery {
        search: non_blank(params.search.as_deref()),
        onboarded: params.onboarded.as_deref().map(|v| v == "true"),
        sort: UserSortColumn::parse_lenient(params.sort.as_deref().unwrap_or_default()),
        ascending: params.ascending(),
        limit: params.limit(),
        offset: params.offset(),
    };
    let page = db.list_users_admin(&query)?;
    Ok(UserList {
        pagination: Pagination::new(params, page.total),
        users: page.items,
    })
}

pub fn get_user(db: &Database, user_id: Uuid) -> Result<UserDetail, ServerError> {
    let user = db.get_user(user_id).or_not_found(USER_NOT_FOUND)?;
    let (notification_count, unread_notification_count) = db.notification_counts(user_id)?;

    Ok(UserDetail {
        friends: db.friend_summaries(user_id)?,
        groups: admin_groups(db, db.groups_for_member(user_id)?)?,
        friend_requests_sent: with_recipients(db, db.requests_sent_by(user_id)?)?,
        friend_requests_received: with_senders(db, db.requests_received_by(user_id)?)?,
        notification_count,
        unread_notification_count,
        user,
    })
}

/// Delete a non-admin user other than the caller, with everything they own.
pub async fn delete_user(state: &AppState, admin: &User, user_id: Uuid) -> Result<(), ServerError> {
    if user_id == admin.id {
        return Err(ServerError::BadRequest(
            "You cannot delete your own account".into(),
        ));
    }

    let channel_ids = {
        let db = state.db()?;
        let target = db.get_user(user_id).or_not_found(USER_NOT_FOUND)?;
        if target.role.is_admin() {
            return Err(ServerError::Forbidden(
                "Cannot delete another admin user".into(),
            ));
        }
        accounts::remove_user(&db, user_id)?
    };
    tracing::info!(%user_id, admin_id = %admin.id, "user deleted by admin");

    state.chat.delete_channels(&channel_ids).await;
    state.chat.delete_user(user_id).await;
    Ok(())
}

pub fn list_groups(db: &Database, params: &ListParams) -> Result<GroupList, ServerError> {
    let query = AdminGroupQuery {
        filter: GroupFilter {
            language: non_blank(params.language.as_deref()),
            search: non_blank(params.search.as_deref()),
        },
        sort: GroupSortColumn::parse_lenient(params.sort.as_deref().unwrap_or_default()),
        ascending: params.ascending(),
        limit: params.limit(),
        offset: params.offset(),
    };
    let page = db.list_groups_admin(&query)?;
    Ok(GroupList {
        pagination: Pagination::new(params, page.total),
        groups: admin_groups(db, page.items)?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroupDetail {
    #[serde(flatten)]
    pub group: AdminGroup,
    pub member_summaries: Vec<UserSummary>,
}

pub fn get_group(db: &Database, group_id: Uuid) -> Result<AdminGroupDetail, ServerError> {
    let group = db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
    let member_summaries = db.user_summaries(&group.members)?;
    let group = admin_groups(db, vec![group])?
        .pop()
        .ok_or_else(|| ServerError::NotFound(GROUP_NOT_FOUND.into()))?;
    Ok(AdminGroupDetail {
        group,
        member_summaries,
    })
}

/// Any group may be deleted by an administrator.
pub async fn delete_group(state: &AppState, admin: &User, group_id: Uuid) -> Result<(), ServerError> {
    community::delete_group(state, admin, group_id).await
}
