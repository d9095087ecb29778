//! Core Error Types
//!
//! Defines the foundational error types used across the Code Historian
//! workspace. These error types are dependency-free (only thiserror + std) to
//! keep the core crate lightweight.
//!
//! The client crate extends these with transport-level variants (network,
//! server, configuration) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the Code Historian workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A state transition that the analysis lifecycle does not allow
    #[error("Invalid transition: cannot apply {transition} while {from}")]
    InvalidTransition {
        from: &'static str,
        transition: &'static str,
    },

    /// A stream frame that could not be decoded into a progress event
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an invalid transition error
    pub fn invalid_transition(from: &'static str, transition: &'static str) -> Self {
        Self::InvalidTransition { from, transition }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
