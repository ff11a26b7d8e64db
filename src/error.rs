//! Relay error types

use thiserror::Error;

/// Relay error type
#[derive(Error, Debug)]
pub enum Error {
    /// No session with the given id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session's event stream has already been claimed by a subscriber
    #[error("Event stream already subscribed for session: {0}")]
    StreamTaken(String),

    /// No pending permission or question with the given id
    #[error("No pending request: {0}")]
    NoPending(String),

    /// Malformed request body or unknown respond kind
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// SSE wire decode failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Upstream engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        self.into()
    }
}

impl From<Error> for axum::response::Response {
    fn from(err: Error) -> Self {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let status = match &err {
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::StreamTaken(_) => StatusCode::CONFLICT,
            Error::NoPending(_) | Error::InvalidRequest(_) | Error::Protocol(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": err.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
