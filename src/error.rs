// Error kinds shared across the ingestion, matching, scheduling and trade
// subsystems. Modeled as a single closed enum (thiserror) rather than one
// error type per module, so the API boundary and the tracing boundary each
// have exactly one place to map from.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Auth(_) => StatusCode::UNAUTHORIZED,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Route to the tracing level appropriate for the kind: client-caused
    /// kinds are a `warn!`, everything that indicates our own process or a
    /// downstream dependency is broken is an `error!`.
    pub fn log(&self) {
        match self {
            CoreError::Auth(msg) => tracing::warn!(error = %msg, kind = "auth", "request rejected"),
            CoreError::Validation(msg) => {
                tracing::warn!(error = %msg, kind = "validation", "request rejected")
            }
            CoreError::NotFound(msg) => tracing::warn!(error = %msg, kind = "not_found", "lookup failed"),
            CoreError::Conflict(msg) => tracing::warn!(error = %msg, kind = "conflict", "state conflict"),
            CoreError::RateLimited(msg) => {
                tracing::warn!(error = %msg, kind = "rate_limited", "request throttled")
            }
            CoreError::ExternalUnavailable(msg) => {
                tracing::error!(error = %msg, kind = "external_unavailable", "downstream dependency failed")
            }
            CoreError::Internal(msg) => {
                tracing::error!(error = %msg, kind = "internal", "internal invariant violated")
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }
}

/// Opaque JSON body for the HTTP boundary. Raw error detail never leaves the
/// process except as the single top-level `error` string; callers correlate
/// via the `alertId`/`requestId` returned alongside it where applicable.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
