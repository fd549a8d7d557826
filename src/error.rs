//! Error types for mcpagent

use thiserror::Error;

/// Result type alias using mcpagent's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mcpagent
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool process could not be started or the handshake failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or unexpected message from a tool process
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Chat completion backend failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Embedding service failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A tool reported a failure
    #[error("Tool invocation failed: {0}")]
    ToolInvocation(String),

    /// Tool call arguments were not a JSON object
    #[error("Invalid tool arguments: {0}")]
    ArgumentParse(String),

    /// No connector exposes the requested tool
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Embedding length differs from the store's dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Operation is not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Remote service is rate limiting or temporarily failing
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout(_) | Error::Unavailable(_))
    }

    /// Errors that abort a whole agent run rather than being reported to the model
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Backend(_) | Error::Config(_) | Error::InvalidState(_)
        )
    }
}
