use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use friendnest_shared::ValidationError;
use friendnest_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or missing input.
    #[error("{0}")]
    BadRequest(String),

    /// The request is well-formed but clashes with current state
    /// (duplicate request, already a member, ...).
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    #[error("Chat service is not configured")]
    ChatUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ValidationError> for ServerError {
    fn from(e: ValidationError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

/// Attach a user-facing message to the store's "missing" and "constraint"
/// outcomes.
pub trait StoreResultExt<T> {
    fn or_not_found(self, message: &str) -> Result<T, ServerError>;
    fn or_conflict(self, message: &str) -> Result<T, ServerError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn or_not_found(self, message: &str) -> Result<T, ServerError> {
        self.map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound(message.to_string()),
            other => ServerError::Store(other),
        })
    }

    fn or_conflict(self, message: &str) -> Result<T, ServerError> {
        self.map_err(|e| match e {
            StoreError::Conflict(detail) => {
                tracing::debug!(%detail, "constraint rejected write");
                ServerError::Conflict(message.to_string())
            }
            other => ServerError::Store(other),
        })
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Conflict(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) | ServerError::Store(StoreError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            ServerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::ChatUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) | ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Store(StoreError::NotFound) => "Not found".to_string(),
            ServerError::Internal(_) | ServerError::Store(_) => {
                tracing::error!(error = %self, "request failed");
                "Internal Server Error".to_string()
            }
            _ => self.to_string(),
        };

        let body = match &self {
            ServerError::RateLimited {
                retry_after_secs, ..
            } => serde_json::json!({
                "success": false,
                "message": message,
                "retryAfter": retry_after_secs,
            }),
            _ => serde_json::json!({
                "success": false,
                "message": message,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::Conflict("dup".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Store(StoreError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Store(StoreError::Migration("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::ChatUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_result_ext() {
        let missing: Result<(), StoreError> = Err(StoreError::NotFound);
        assert!(matches!(
            missing.or_not_found("Group not found"),
            Err(ServerError::NotFound(m)) if m == "Group not found"
        ));

        let dup: Result<(), StoreError> = Err(StoreError::Conflict("UNIQUE".into()));
        assert!(matches!(
            dup.or_conflict("Already a member"),
            Err(ServerError::Conflict(m)) if m == "Already a member"
        ));
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err: ServerError = ValidationError::InvalidEmail.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
