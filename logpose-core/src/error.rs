//! Error types for the logpose core library.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all core operations.
#[derive(Error, Debug)]
pub enum LogposeError {
    /// The stored world clock does not match `YYYY-MM-DD HH:MM:SS`.
    #[error("Malformed timestamp: '{value}' (expected YYYY-MM-DD HH:MM:SS)")]
    MalformedTimestamp {
        /// The offending stored value.
        value: String,
    },

    /// Advancing the clock would leave the representable date range.
    #[error("Time advance overflowed: {days}d {hours}h {minutes}m")]
    TimeOverflow {
        /// Requested days.
        days: i64,
        /// Requested hours.
        hours: i64,
        /// Requested minutes.
        minutes: i64,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A directive could not be folded into the world without breaking it.
    #[error("Merge rejected: {0}")]
    MergeRejected(String),

    /// The backup document needed for a world reset does not exist.
    #[error("Backup document not found: {}", .0.display())]
    BackupMissing(PathBuf),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LogposeError {
    fn from(err: serde_json::Error) -> Self {
        LogposeError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LogposeError>;
