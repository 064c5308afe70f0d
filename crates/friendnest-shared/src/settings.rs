//! Per-user privacy, notification and language preferences.
//!
//! Stored as one JSON column. Every field has a default so rows written by
//! older versions (or with missing keys) still deserialize.

use serde::{Deserialize, Serialize};

use crate::types::FriendRequestPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub privacy: PrivacySettings,
    pub notifications: NotificationSettings,
    pub language: LanguageSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrivacySettings {
    pub who_can_send_friend_requests: FriendRequestPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub friend_requests: bool,
    pub friend_acceptances: bool,
    pub friend_removals: bool,
    pub messages: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            friend_requests: true,
            friend_acceptances: true,
            friend_removals: true,
            messages: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanguageSettings {
    pub preferred_language: String,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            preferred_language: "en".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// A settings update. Each supplied block is merged key by key into the
/// stored settings; absent keys keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub privacy: Option<PrivacyPatch>,
    pub notifications: Option<NotificationPatch>,
    pub language: Option<LanguagePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrivacyPatch {
    pub who_can_send_friend_requests: Option<FriendRequestPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationPatch {
    pub friend_requests: Option<bool>,
    pub friend_acceptances: Option<bool>,
    pub friend_removals: Option<bool>,
    pub messages: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanguagePatch {
    pub preferred_language: Option<String>,
}

impl UserSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(privacy) = patch.privacy {
            if let Some(policy) = privacy.who_can_send_friend_requests {
                self.privacy.who_can_send_friend_requests = policy;
            }
        }

        if let Some(n) = patch.notifications {
            if let Some(v) = n.friend_requests {
                self.notifications.friend_requests = v;
            }
            if let Some(v) = n.friend_acceptances {
                self.notifications.friend_acceptances = v;
            }
            if let Some(v) = n.friend_removals {
                self.notifications.friend_removals = v;
            }
            if let Some(v) = n.messages {
                self.notifications.messages = v;
            }
        }

        if let Some(language) = patch.language {
            if let Some(lang) = language.preferred_language {
                self.language.preferred_language = lang;
            }
        }
    }
}
