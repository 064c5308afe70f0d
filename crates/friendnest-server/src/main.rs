//! # friendnest-server
//!
//! Backend of the FriendNest language-exchange network.
//!
//! This binary provides:
//! - **Accounts** with argon2 passwords and bearer sessions
//! - **Social graph**: friend requests, friendships and user discovery
//! - **Language groups** with events and a chat channel per group
//! - **Notifications** for social events and chat messages
//! - **Admin back-office** behind a role check and per-IP rate limiting
//!
//! Group chat runs on Stream; without credentials the integration is
//! disabled and every channel call becomes a no-op.

mod accounts;
mod admin;
mod api;
mod chat;
mod community;
mod config;
mod error;
mod notifications;
mod rate_limit;
mod session;
mod social;
#[cfg(test)]
mod testing;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use friendnest_shared::constants::{APP_NAME, RATE_LIMIT_WINDOW_SECS};
use friendnest_store::Database;

use crate::api::AppState;
use crate::chat::{ChannelProvider, Chat, NoopChannelProvider, StreamChatProvider};
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,friendnest_server=debug")),
        )
        .init();

    info!("Starting {APP_NAME} server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database and seed the administrator
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database ready");

    if let Some(seed) = &config.admin_seed {
        let admin = accounts::ensure_admin(&db, seed)?;
        info!(user_id = %admin.id, email = %admin.email, "Admin account ready");
    }

    // -----------------------------------------------------------------------
    // 4. Chat provider
    // -----------------------------------------------------------------------
    let provider: Arc<dyn ChannelProvider> = match &config.stream {
        Some(credentials) => Arc::new(StreamChatProvider::new(
            credentials,
            &config.stream_base_url,
            config.chat_timeout,
        )?),
        None => {
            warn!("Stream credentials not set, chat integration disabled");
            Arc::new(NoopChannelProvider)
        }
    };

    let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        chat: Chat::new(provider, config.chat_timeout),
        admin_limiter: RateLimiter::admin(config.admin_rate_limit, window),
        admin_login_limiter: RateLimiter::admin_login(config.admin_login_rate_limit, window),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 5. Spawn background tasks
    // -----------------------------------------------------------------------

    // Drop expired rate-limit windows every 5 minutes
    let limiters = [
        app_state.admin_limiter.clone(),
        app_state.admin_login_limiter.clone(),
    ];
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.purge_stale().await;
            }
        }
    });

    // Purge expired sessions hourly
    let db = app_state.db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let purged = match db.lock() {
                Ok(db) => db.purge_expired_sessions(Utc::now()),
                Err(_) => {
                    tracing::error!("database lock poisoned, stopping session purge");
                    return;
                }
            };
            match purged {
                Ok(0) => {}
                Ok(n) => info!(sessions = n, "Purged expired sessions"),
                Err(e) => warn!(error = %e, "Session purge failed"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // 6. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
