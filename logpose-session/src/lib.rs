//! # logpose-session: the turn pipeline
//!
//! Glues the state core (`logpose-core`) to the generation layer
//! (`logpose-llm`) and runs one player input at a time.
//!
//! ## Architecture
//!
//! ```text
//! input ──► commands ─────────────────────────────► reply
//!   │
//!   └──► context ──► narrator ──► [editor] ──► parse ──► merge ──► store
//! ```
//!
//! ## Modules
//!
//! - `context`: narrator instructions and conversation window
//! - `crosscheck`: optional editor pass with fallback to the draft
//! - `pipeline`: turn stages and outcome
//! - `commands`: reset phrases and the HUD line
//! - `session`: session state and generator wiring

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod context;
pub mod crosscheck;
pub mod error;
pub mod pipeline;
pub mod session;

pub use commands::Command;
pub use error::SessionError;
pub use pipeline::{MergeStatus, TurnOutcome, TurnStage};
pub use session::{Reply, Session};
