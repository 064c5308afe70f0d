//! HTTP API: shared state, response envelope and the router.

mod admin;
mod auth;
mod groups;
mod notifications;
mod users;

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    http::{Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use friendnest_store::Database;

use crate::chat::Chat;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub chat: Chat,
    pub admin_limiter: RateLimiter,
    pub admin_login_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Lock the database. The guard must be dropped before any `.await`.
    pub fn db(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct Data<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
pub(crate) struct Message {
    success: bool,
    message: &'static str,
}

pub(crate) type ApiResult<T> = Result<Json<Data<T>>, ServerError>;
pub(crate) type Created<T> = Result<(StatusCode, Json<Data<T>>), ServerError>;

pub(crate) fn data<T: Serialize>(data: T) -> Json<Data<T>> {
    Json(Data {
        success: true,
        data,
    })
}

pub(crate) fn created<T: Serialize>(value: T) -> (StatusCode, Json<Data<T>>) {
    (StatusCode::CREATED, data(value))
}

pub(crate) fn message(message: &'static str) -> Json<Message> {
    Json(Message {
        success: true,
        message,
    })
}

/// Parse an id from the path. A malformed id cannot name an existing
/// record, so it is reported like a missing one.
pub(crate) fn path_id(raw: &str, not_found: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServerError::NotFound(not_found.to_string()))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth::routes())
        .route("/api/chat/token", get(auth::chat_token))
        .nest("/api/users", users::routes())
        .nest("/api/groups", groups::routes())
        .nest("/api/notifications", notifications::routes())
        .nest("/api/admin", admin_routes(&state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every admin route shares one per-address budget; login has a second,
/// tighter one.
fn admin_routes(state: &AppState) -> Router<AppState> {
    let login = Router::new()
        .route("/login", post(admin::login))
        .layer(middleware::from_fn_with_state(
            state.admin_login_limiter.clone(),
            rate_limit_middleware,
        ));

    admin::routes()
        .merge(login)
        .layer(middleware::from_fn_with_state(
            state.admin_limiter.clone(),
            rate_limit_middleware,
        ))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
