//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request could not be bound to a session. The cause is logged, not returned.
    #[error("Cannot start session")]
    SessionUnavailable,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<msm_session::Error> for ServerError {
    fn from(e: msm_session::Error) -> Self {
        match e {
            msm_session::Error::Argument(msg) | msm_session::Error::Request(msg) => {
                ServerError::BadRequest(msg)
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::SessionUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "session_unavailable")
            }
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
