use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors raised by the HTTP layer itself.
///
/// Upstream outcomes are not errors here; handlers turn those into
/// `{success: false, ...}` bodies.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or invalid session cookie on a protected route.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Too many requests from one client in one endpoint family.
    #[error("Rate limited")]
    RateLimited,

    /// Malformed request body or parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local failure: disk, encryption, serialization.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "error": "unauthorized"})),
            )
                .into_response(),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"success": false, "error": "rate_limited"})),
            )
                .into_response(),
            Self::BadRequest(ref msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": msg})),
            )
                .into_response(),
            Self::Config(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Gateway internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "error": "internal"})),
                )
                    .into_response()
            }
        }
    }
}

impl From<crate::error::Error> for GatewayError {
    fn from(e: crate::error::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
