//! Error types for Conduit

use thiserror::Error;

/// Result type alias for Conduit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Conduit
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool provider unreachable. Fatal during session setup.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Model backend call failed. The turn is aborted and may be retried.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Tool error: {0}")]
    ToolInvocation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Empty input")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the session can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Connection(_) | Error::Config(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
