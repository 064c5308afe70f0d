//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.  Without Stream credentials the chat
//! integration is disabled and every channel call becomes a no-op.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use friendnest_shared::constants::{
    ADMIN_LOGIN_RATE_LIMIT, ADMIN_RATE_LIMIT, DEFAULT_HTTP_PORT, SESSION_TTL_HOURS,
};

/// Stream Chat API credentials.
#[derive(Clone)]
pub struct StreamCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for StreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Administrator account created at startup if it does not exist yet.
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./friendnest.db`
    pub database_path: PathBuf,

    /// Env: `STREAM_API_KEY` / `STREAM_API_SECRET` (legacy `STEAM_*` also read).
    /// Default: unset, chat disabled.
    pub stream: Option<StreamCredentials>,

    /// Env: `STREAM_BASE_URL`
    pub stream_base_url: String,

    /// Upper bound on every outbound chat call.
    /// Env: `CHAT_TIMEOUT_SECS`
    /// Default: `5`
    pub chat_timeout: Duration,

    /// Env: `SESSION_TTL_HOURS`
    /// Default: `168` (one week)
    pub session_ttl_hours: i64,

    /// Env: `ADMIN_EMAIL` / `ADMIN_PASSWORD` / `ADMIN_NAME`
    pub admin_seed: Option<AdminSeed>,

    /// Requests per 15-minute window on `/api/admin/*`.
    /// Env: `ADMIN_RATE_LIMIT`
    pub admin_rate_limit: u32,

    /// Requests per 15-minute window on `/api/admin/login`.
    /// Env: `ADMIN_LOGIN_RATE_LIMIT`
    pub admin_login_rate_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./friendnest.db"),
            stream: None,
            stream_base_url: "https://chat.stream-io-api.com".to_string(),
            chat_timeout: Duration::from_secs(5),
            session_ttl_hours: SESSION_TTL_HOURS,
            admin_seed: None,
            admin_rate_limit: ADMIN_RATE_LIMIT,
            admin_login_rate_limit: ADMIN_LOGIN_RATE_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        };

        if let Some(addr) = var(&["HTTP_ADDR"]) {
            config.http_addr = parse_or_default("HTTP_ADDR", &addr, config.http_addr);
        }

        if let Some(path) = var(&["DATABASE_PATH"]) {
            config.database_path = PathBuf::from(path);
        }

        match (
            var(&["STREAM_API_KEY", "STEAM_API_KEY"]),
            var(&["STREAM_API_SECRET", "STEAM_API_SECRET"]),
        ) {
            (Some(api_key), Some(api_secret)) => {
                config.stream = Some(StreamCredentials { api_key, api_secret });
            }
            (None, None) => {}
            _ => tracing::warn!("Only one of the Stream API key/secret is set, chat disabled"),
        }

        if let Some(url) = var(&["STREAM_BASE_URL"]) {
            config.stream_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(secs) = var(&["CHAT_TIMEOUT_SECS"]) {
            let secs = parse_or_default("CHAT_TIMEOUT_SECS", &secs, config.chat_timeout.as_secs());
            config.chat_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(hours) = var(&["SESSION_TTL_HOURS"]) {
            config.session_ttl_hours =
                parse_or_default("SESSION_TTL_HOURS", &hours, config.session_ttl_hours).max(1);
        }

        if let (Some(email), Some(password)) = (var(&["ADMIN_EMAIL"]), var(&["ADMIN_PASSWORD"])) {
            config.admin_seed = Some(AdminSeed {
                email: email.trim().to_lowercase(),
                password,
                full_name: var(&["ADMIN_NAME"]).unwrap_or_else(|| "Administrator".to_string()),
            });
        }

        if let Some(limit) = var(&["ADMIN_RATE_LIMIT"]) {
            config.admin_rate_limit =
                parse_or_default("ADMIN_RATE_LIMIT", &limit, config.admin_rate_limit);
        }

        if let Some(limit) = var(&["ADMIN_LOGIN_RATE_LIMIT"]) {
            config.admin_login_rate_limit =
                parse_or_default("ADMIN_LOGIN_RATE_LIMIT", &limit, config.admin_login_rate_limit);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_or_default<T: FromStr>(key: &str, value: &str, default: T) -> T {
    match value.trim().parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(key, value, "Invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5001).into());
        assert!(config.stream.is_none());
        assert_eq!(config.chat_timeout, Duration::from_secs(5));
        assert_eq!(config.admin_rate_limit, 100);
        assert_eq!(config.admin_login_rate_limit, 5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("SESSION_TTL_HOURS", "soon"),
            ("ADMIN_RATE_LIMIT", "-3"),
        ]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.session_ttl_hours, SESSION_TTL_HOURS);
        assert_eq!(config.admin_rate_limit, ADMIN_RATE_LIMIT);
    }

    #[test]
    fn test_legacy_stream_variables() {
        let config = config_from(&[("STEAM_API_KEY", "key"), ("STEAM_API_SECRET", "secret")]);
        let creds = config.stream.unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.api_secret, "secret");
    }

    #[test]
    fn test_half_configured_stream_is_disabled() {
        let config = config_from(&[("STREAM_API_KEY", "key")]);
        assert!(config.stream.is_none());
    }

    #[test]
    fn test_admin_seed_requires_email_and_password() {
        assert!(config_from(&[("ADMIN_EMAIL", "root@example.com")])
            .admin_seed
            .is_none());

        let seed = config_from(&[
            ("ADMIN_EMAIL", " Root@Example.com "),
            ("ADMIN_PASSWORD", "hunter22"),
        ])
        .admin_seed
        .unwrap();
        assert_eq!(seed.email, "root@example.com");
        assert_eq!(seed.full_name, "Administrator");
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let config = config_from(&[("STREAM_API_KEY", "key"), ("STREAM_API_SECRET", "s3cr3t")]);
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
