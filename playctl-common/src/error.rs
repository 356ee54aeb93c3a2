//! Common error types for playctl

use thiserror::Error;

/// Common result type for playctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by playctl crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error, including unreadable files
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listen port outside 1-65535 or not a number
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Client message that is not a well-formed invocation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
