//! Domain model structs persisted in the SQLite database.
//!
//! Every read model derives `Serialize` with camelCase keys so handlers can
//! return it directly as JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use friendnest_shared::{FriendRequestStatus, NotificationType, Role, UserSettings};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    /// Argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: String,
    pub profile_pic: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub is_onboarded: bool,
    pub role: Role,
    pub settings: UserSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public slice of a user embedded in other responses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub profile_pic: String,
    pub native_language: String,
    pub learning_language: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_pic: String,
    pub role: Role,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub profile_pic: Option<String>,
    pub is_onboarded: Option<bool>,
}

/// Directory search over onboarded users.
#[derive(Debug, Clone, Default)]
pub struct UserSearch {
    pub query: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub sort: friendnest_shared::UserSort,
    pub limit: u32,
}

/// Admin listing sort column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserSortColumn {
    #[default]
    CreatedAt,
    UpdatedAt,
    FullName,
    Email,
}

impl UserSortColumn {
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "updatedAt" => Self::UpdatedAt,
            "fullName" => Self::FullName,
            "email" => Self::Email,
            _ => Self::CreatedAt,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::FullName => "full_name",
            Self::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminUserQuery {
    pub search: Option<String>,
    pub onboarded: Option<bool>,
    pub sort: UserSortColumn,
    pub ascending: bool,
    pub limit: u32,
    pub offset: u32,
}

/// A user row with the counters shown in the admin listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithCounts {
    #[serde(flatten)]
    pub user: User,
    pub friends_count: u32,
    pub groups_count: u32,
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FriendRequest {
    /// The party on the other side of the request from `user_id`.
    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.recipient_id
        } else {
            self.sender_id
        }
    }
}

// ---------------------------------------------------------------------------
// Group & event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub language: String,
    pub cover_image: String,
    pub creator_id: Uuid,
    /// Empty until the chat channel has been provisioned.
    pub stream_channel_id: String,
    /// Member ids in join order; the creator is always first.
    pub members: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub language: String,
    pub cover_image: String,
    pub creator_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub language: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupSortColumn {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Language,
}

impl GroupSortColumn {
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "updatedAt" => Self::UpdatedAt,
            "name" => Self::Name,
            "language" => Self::Language,
            _ => Self::CreatedAt,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Name => "name",
            Self::Language => "language",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminGroupQuery {
    pub filter: GroupFilter,
    pub sort: GroupSortColumn,
    pub ascending: bool,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub organizer_id: Uuid,
    /// Attendee ids in RSVP order; the organizer is always first.
    pub attendees: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_attending(&self, user_id: Uuid) -> bool {
        self.attendees.contains(&user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub group_id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub organizer_id: Uuid,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub sender_id: Option<Uuid>,
    pub channel_id: Option<String>,
    pub is_read: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub message: String,
    pub sender_id: Option<Uuid>,
    pub channel_id: Option<String>,
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}
