//! Cross-check pass.
//!
//! A second model reads the narrator's draft and may rewrite it. When it
//! changes the outcome it must also change the directive. The pass is an
//! enhancement: any failure keeps the draft as the final text.

use logpose_core::parser::{self, ParsedResponse};
use logpose_llm::prompt::{PromptBook, PromptId};
use logpose_llm::{ChatMessage, Generate, LlmRequest};
use tracing::{info, warn};

use crate::context::Snapshot;

/// Result of the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossCheck {
    /// Raw text the turn should be parsed from.
    pub text: String,
    /// Whether `text` came from the editor.
    pub revised: bool,
    /// Why the draft was kept, when the editor ran but was not used.
    pub fallback: Option<String>,
}

impl CrossCheck {
    fn keep(draft: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "cross-check unusable, keeping draft");
        Self {
            text: draft.to_string(),
            revised: false,
            fallback: Some(reason),
        }
    }
}

/// Inputs the editor prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct ReviewInput<'a> {
    /// Player action for the turn.
    pub user_input: &'a str,
    /// Raw narrator output.
    pub draft: &'a str,
    /// `draft` already parsed.
    pub draft_parsed: &'a ParsedResponse,
    /// State snapshot the narrator saw.
    pub snapshot: &'a Snapshot,
    /// Log line cap, for the rules section.
    pub log_cap: usize,
}

/// Sampling settings for the editor call.
#[derive(Debug, Clone, Copy)]
pub struct EditorSettings {
    /// Temperature.
    pub temperature: f32,
    /// Output token limit.
    pub max_tokens: u32,
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Editor request for `input`.
#[must_use]
pub fn editor_request(prompts: &PromptBook, input: &ReviewInput<'_>, settings: EditorSettings) -> LlmRequest {
    let log_cap = input.log_cap.to_string();
    let system = prompts.render(PromptId::EditorSystem, &input.snapshot.vars(&log_cap));
    let user = prompts.render(
        PromptId::EditorUser,
        &[("user_input", input.user_input), ("draft", input.draft)],
    );
    LlmRequest::new(system, vec![ChatMessage::user(user)])
        .with_temperature(settings.temperature)
        .with_max_tokens(settings.max_tokens)
        .with_timeout(settings.timeout_ms)
}

/// Run the editor over the draft, falling back to the draft on any failure.
pub async fn review<G: Generate>(
    editor: &G,
    prompts: &PromptBook,
    input: &ReviewInput<'_>,
    settings: EditorSettings,
) -> CrossCheck {
    if !editor.is_available() {
        return CrossCheck::keep(input.draft, "editor has no backend");
    }

    let request = editor_request(prompts, input, settings);
    let response = match editor.generate(&request).await {
        Ok(response) => response,
        Err(e) => return CrossCheck::keep(input.draft, format!("editor call failed: {e}")),
    };

    let revised = response.text.trim();
    if revised.is_empty() {
        return CrossCheck::keep(input.draft, "editor returned nothing");
    }

    let parsed = parser::parse(revised);
    if input.draft_parsed.directive.is_some() && parsed.directive.is_none() {
        return CrossCheck::keep(input.draft, "editor dropped the directive block");
    }
    if parsed.narrative.is_empty() {
        return CrossCheck::keep(input.draft, "editor returned no narrative");
    }

    info!(model = %response.model, latency_ms = response.latency_ms, "draft revised by editor");
    CrossCheck {
        text: revised.to_string(),
        revised: true,
        fallback: None,
    }
}
