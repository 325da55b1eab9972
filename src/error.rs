//! Custom error types for devloop.
//!
//! The taxonomy is deliberately small: an absent loop record is *not* an
//! error (callers see `Ok(None)`), and every recoverable condition on the
//! stop-hook path is handled locally by the controller. The variants here
//! cover the few ways a file can genuinely fail underneath us.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for devloop operations
#[derive(Error, Debug)]
pub enum DevLoopError {
    /// The loop record exists but could not be read
    #[error("Cannot read state file {path}: {message}")]
    StateUnreadable { path: PathBuf, message: String },

    /// The transcript path supplied by the host does not exist on disk
    #[error("Transcript not found: {path}")]
    TranscriptUnavailable { path: PathBuf },

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DevLoopError {
    /// Create a state-unreadable error for the given record path
    pub fn state_unreadable(path: PathBuf, source: &std::io::Error) -> Self {
        Self::StateUnreadable {
            path,
            message: source.to_string(),
        }
    }

    /// Create a transcript-unavailable error
    pub fn transcript_unavailable(path: impl Into<PathBuf>) -> Self {
        Self::TranscriptUnavailable { path: path.into() }
    }
}

/// Type alias for devloop results
pub type Result<T> = std::result::Result<T, DevLoopError>;
