/// Application name
pub const APP_NAME: &str = "FriendNest";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Stream Chat channel type used for every group channel
pub const CHANNEL_TYPE: &str = "messaging";

/// Prefix of the deterministic chat channel id derived from a group id
pub const GROUP_CHANNEL_PREFIX: &str = "group-";

/// Minimum password length accepted at signup and password change
pub const MIN_PASSWORD_LEN: usize = 6;

/// Accepted/removed friend request history returned per role
pub const FRIEND_REQUEST_HISTORY_LIMIT: u32 = 10;

/// Notifications returned by the listing endpoint
pub const NOTIFICATION_LIST_LIMIT: u32 = 100;

/// Users returned by a directory search
pub const USER_SEARCH_LIMIT: u32 = 50;

/// Recent users/groups/events shown on the admin dashboard
pub const RECENT_ACTIVITY_LIMIT: u32 = 5;

/// Languages listed in the dashboard breakdown
pub const LANGUAGE_BREAKDOWN_LIMIT: u32 = 10;

/// Admin listing page size
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Rate limit window shared by the admin limiters (15 minutes)
pub const RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Requests per window on `/admin/*`
pub const ADMIN_RATE_LIMIT: u32 = 100;

/// Admin login attempts per window
pub const ADMIN_LOGIN_RATE_LIMIT: u32 = 5;

/// Default session lifetime (7 days)
pub const SESSION_TTL_HOURS: i64 = 24 * 7;

/// Placeholder body for message notifications without a preview
pub const DEFAULT_MESSAGE_PREVIEW: &str = "New message";
