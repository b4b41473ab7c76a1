//! # logpose core
//!
//! State-synchronisation core for an LLM-narrated text RPG.
//!
//! The model writes free text with one fenced JSON block embedded in it.
//! This crate turns that text into a [`ParsedResponse`] and folds the
//! embedded [`Directive`] into the persistent [`WorldState`] without
//! corrupting it:
//!
//! - [`store`]: fail-soft JSON documents on disk (world, transcript, prompts)
//! - [`clock`]: absolute in-world time advanced by model-reported deltas
//! - [`parser`]: narrative / directive split
//! - [`merge`]: declarative field-policy merge of a directive into the world
//! - [`transcript`]: append-only conversation log and its bounded window
//!
//! Nothing here talks to the network; generation lives in `logpose-llm`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod parser;
pub mod store;
pub mod transcript;
pub mod types;

pub use config::LogposeConfig;
pub use error::{LogposeError, Result};
pub use merge::{MergeEngine, MergeReport};
pub use parser::{Directive, ParsedResponse, TimePassed};
pub use transcript::{ConversationTurn, Role, StoryBuffer, Transcript};
pub use types::{Character, Location, Player, WorldSection, WorldState};
