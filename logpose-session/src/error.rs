//! Session error types.

use logpose_core::LogposeError;
use logpose_llm::LlmError;
use thiserror::Error;

/// Errors that abort a turn or a command.
///
/// Anything that happens after a successful generation call (malformed
/// directive, rejected merge, editor failure) is reported in the turn
/// outcome instead and never shows up here.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The narrator call failed; nothing was persisted.
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    /// A store or state operation failed.
    #[error(transparent)]
    Core(#[from] LogposeError),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SessionError>;
