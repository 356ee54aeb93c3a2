//! Error types for playctl-api
//!
//! Every request-level variant renders as a typed `{type:"error", error}`
//! reply; none of them is fatal. Only [`Error::Bind`] is reported to the
//! owning process.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use playctl_common::ServerFrame;
use thiserror::Error;

/// Main error type for playctl-api
#[derive(Error, Debug)]
pub enum Error {
    /// Required parameter missing or failing its validator
    #[error("Malformed {0} action")]
    Malformed(String),

    /// Action unknown to the registry and to the engine, or the engine call
    /// failed or timed out
    #[error("Action \"{0}\" failed or not found")]
    ActionFailed(String),

    /// HTTP request without an action name in the path
    #[error("No action specified")]
    NoAction,

    /// HTTP body that is not a JSON object; carries the parse message
    #[error("{0}")]
    InvalidBody(String),

    /// WebSocket frame that is not a JSON invocation
    #[error("Invalid message format")]
    InvalidMessage,

    /// Listener could not bind its port
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error bubbled up from playctl-common
    #[error(transparent)]
    Common(#[from] playctl_common::Error),
}

/// Convenience Result type using playctl-api Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Bind { .. } | Error::Config(_) | Error::Common(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Typed error frame for WebSocket replies
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::error(self.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_frame())).into_response()
    }
}
