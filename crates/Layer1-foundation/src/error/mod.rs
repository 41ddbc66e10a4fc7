//! Error types for Relay
//!
//! Central error taxonomy for the whole workspace. Every failure that crosses
//! a crate boundary is one of these variants.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Task registry
    // ========================================================================
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ========================================================================
    // One-shot execution
    // ========================================================================
    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Process exited with code {code}")]
    NonZeroExit {
        code: i32,
        /// Output accumulated before the failure, never silently dropped.
        output: String,
    },

    #[error("Timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    // ========================================================================
    // Persistent sessions
    // ========================================================================
    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("No active session: {0}")]
    NotRunning(String),

    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Partial output carried by the error, if any.
    ///
    /// A non-zero exit keeps everything the process wrote before dying so the
    /// caller can surface it alongside the failure.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Error::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}
