//! # logpose-llm: Generation-Service Layer for logpose
//!
//! Provides a unified interface for text generation across backends:
//!   - **OpenAI-compatible API** (default; also works with Together, Groq, etc.)
//!   - **Ollama** (local)
//!
//! All model calls in logpose go through this crate, which owns:
//!   - Timeout management
//!   - Optional retries
//!   - Prompt templates and their overrides
//!
//! # Architecture
//!
//! ```text
//! Narrator : drafts each turn (narrative + fenced json block)
//! Editor   : optional cross-check pass over the draft
//! ```
//!
//! Both roles are plain [`LlmClient`]s behind the [`Generate`] trait.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{Generate, LlmClient, LlmProvider};
pub use error::LlmError;
pub use prompt::{PromptBook, PromptId};
pub use types::{ChatMessage, ChatRole, LlmRequest, LlmResponse};
