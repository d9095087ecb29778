//! Error Handling
//!
//! Client-wide error type. Uses thiserror for ergonomic error definitions.
//!
//! The variants follow the failure taxonomy of the analysis client:
//! configuration problems are never retried, network failures are, server
//! failures only within the reconnect budget, and an expired session makes the
//! reconnect path fall back to a full start.

use code_historian_core::CoreError;
use thiserror::Error;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum HistorianError {
    /// Server URL or API key missing, or an unusable request
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection refused, DNS failure, timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success status or an undecodable response body
    #[error("Server error: {0}")]
    Server(String),

    /// A frame or payload that does not match the wire format
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server no longer recognizes the session id
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors bubbled up from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for client errors
pub type HistorianResult<T> = Result<T, HistorianError>;

impl HistorianError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a session expired error
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a user-initiated retry can reasonably succeed.
    ///
    /// Configuration and validation problems need the user to change
    /// settings first.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HistorianError::Configuration(_) | HistorianError::Validation(_)
        )
    }
}

impl From<reqwest::Error> for HistorianError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Server(format!("malformed response body: {}", err))
        } else if let Some(status) = err.status() {
            Self::Server(format!("unexpected status {}", status))
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Convert HistorianError to a string suitable for UI messages
impl From<HistorianError> for String {
    fn from(err: HistorianError) -> String {
        err.to_string()
    }
}
