use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::GROUP_CHANNEL_PREFIX;
use crate::error::ParseEnumError;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Friend request status
// ---------------------------------------------------------------------------

/// Lifecycle of a friend request.
///
/// `Pending -> Accepted` is the only transition. `Removed` rows are created
/// directly when a friendship is dissolved and only serve as a one-shot
/// notice to the removed party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Removed,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Removed => "removed",
        }
    }

    /// Pending and accepted requests count towards the one-per-pair limit.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }
}

impl FromStr for FriendRequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "removed" => Ok(Self::Removed),
            other => Err(ParseEnumError::new("friend request status", other)),
        }
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of an accepted request the viewing user was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestRole {
    Sender,
    Recipient,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    FriendRequest,
    Message,
    FriendAccepted,
    FriendRemoved,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friendRequest",
            Self::Message => "message",
            Self::FriendAccepted => "friendAccepted",
            Self::FriendRemoved => "friendRemoved",
        }
    }
}

impl FromStr for NotificationType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friendRequest" => Ok(Self::FriendRequest),
            "message" => Ok(Self::Message),
            "friendAccepted" => Ok(Self::FriendAccepted),
            "friendRemoved" => Ok(Self::FriendRemoved),
            other => Err(ParseEnumError::new("notification type", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Privacy
// ---------------------------------------------------------------------------

/// Who may send the user a friend request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FriendRequestPolicy {
    #[default]
    Everyone,
    FriendsOfFriends,
    Nobody,
}

// ---------------------------------------------------------------------------
// Directory sort order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserSort {
    #[default]
    RecentlyActive,
    NewUsers,
    Location,
    Name,
}

impl UserSort {
    /// Unknown values fall back to the default ordering.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "newUsers" => Self::NewUsers,
            "location" => Self::Location,
            "name" => Self::Name,
            _ => Self::RecentlyActive,
        }
    }
}

/// Chat channel id for a group. Deterministic so that a lost write of the
/// id can be repaired by recreating the same channel.
pub fn group_channel_id(group_id: &Uuid) -> String {
    format!("{GROUP_CHANNEL_PREFIX}{group_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            FriendRequestStatus::Pending,
            FriendRequestStatus::Accepted,
            FriendRequestStatus::Removed,
        ] {
            assert_eq!(status.as_str().parse::<FriendRequestStatus>(), Ok(status));
        }
        assert!("declined".parse::<FriendRequestStatus>().is_err());
    }

    #[test]
    fn test_removed_is_not_active() {
        assert!(FriendRequestStatus::Pending.is_active());
        assert!(FriendRequestStatus::Accepted.is_active());
        assert!(!FriendRequestStatus::Removed.is_active());
    }

    #[test]
    fn test_notification_type_serde_matches_str() {
        let json = serde_json::to_string(&NotificationType::FriendAccepted).unwrap();
        assert_eq!(json, "\"friendAccepted\"");
        assert_eq!(
            "friendRemoved".parse::<NotificationType>(),
            Ok(NotificationType::FriendRemoved)
        );
    }

    #[test]
    fn test_policy_deserializes_camel_case() {
        let policy: FriendRequestPolicy = serde_json::from_str("\"friendsOfFriends\"").unwrap();
        assert_eq!(policy, FriendRequestPolicy::FriendsOfFriends);
    }

    #[test]
    fn test_user_sort_falls_back() {
        assert_eq!(UserSort::parse_lenient("name"), UserSort::Name);
        assert_eq!(UserSort::parse_lenient("bogus"), UserSort::RecentlyActive);
    }

    #[test]
    fn test_group_channel_id() {
        let id = Uuid::nil();
        assert_eq!(
            group_channel_id(&id),
            "group-00000000-0000-0000-0000-000000000000"
        );
    }
}
