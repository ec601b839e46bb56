//! Errors surfaced at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use board_core::InvalidProjectId;

/// Failures the hub reports to HTTP callers or the binary.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The `{project_id}` path segment is not an integer.
    #[error(transparent)]
    InvalidProjectId(#[from] InvalidProjectId),
    /// The request could not be interpreted.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidProjectId(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Bind { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::InvalidProjectId(_) => "Invalid project ID".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Bind { .. } | Self::Io(_) => "internal error".to_string(),
        };
        (self.status(), body).into_response()
    }
}
