//! The turn pipeline.
//!
//! ```text
//! AwaitingInput → DraftGenerated → [CrossChecked] → Parsed
//!               → Merged | MergeSkipped → Persisted
//! ```
//!
//! A failed narrator call aborts the turn before anything is written. Past
//! that point nothing aborts: a missing, malformed or rejected directive
//! only skips the merge, and the narrative is still recorded.

use logpose_core::parser::{self, Directive, ParsedResponse};
use logpose_core::transcript::ConversationTurn;
use logpose_core::{LogposeError, MergeReport, WorldState};
use logpose_llm::Generate;
use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::context::ContextWindow;
use crate::crosscheck::{self, CrossCheck, EditorSettings, ReviewInput};
use crate::error::Result;
use crate::session::{Reply, Session};

/// Where a turn is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    /// Waiting for the player.
    AwaitingInput,
    /// The narrator answered.
    DraftGenerated,
    /// The editor's revision replaced the draft.
    CrossChecked,
    /// The final text was split into narrative and directive.
    Parsed,
    /// The directive was applied to the world.
    Merged,
    /// No directive was applied; the world is unchanged.
    MergeSkipped,
    /// World and transcript were written.
    Persisted,
}

/// What happened to the directive this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStatus {
    /// Applied to the world.
    Applied(MergeReport),
    /// The response carried no directive block.
    NoDirective,
    /// A block was present but unusable.
    Malformed(String),
    /// The directive parsed but could not be applied.
    Rejected(String),
}

/// Everything a front end needs to show for one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Story text for the player.
    pub narrative: String,
    /// Stages passed through, in order.
    pub stages: Vec<TurnStage>,
    /// The directive parsed from the final text.
    pub directive: Option<Directive>,
    /// Merge result.
    pub merge: MergeStatus,
    /// Cross-check result, when the pass ran.
    pub cross_check: Option<CrossCheck>,
    /// World clock after the turn.
    pub world_time: String,
}

impl TurnOutcome {
    /// Whether the world changed this turn.
    #[must_use]
    pub fn merged(&self) -> bool {
        matches!(self.merge, MergeStatus::Applied(_))
    }

    /// A short note for the player when the directive was not applied.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        match &self.merge {
            MergeStatus::Applied(_) | MergeStatus::NoDirective => None,
            MergeStatus::Malformed(reason) | MergeStatus::Rejected(reason) => {
                Some(format!("(state not updated: {reason})"))
            }
        }
    }
}

impl<G: Generate> Session<G> {
    /// Handle one input line: a command, a model turn, or nothing.
    ///
    /// # Errors
    /// See [`Session::execute`] and [`Session::run_turn`].
    pub async fn handle(&mut self, input: &str) -> Result<Reply> {
        if input.trim().is_empty() {
            return Ok(Reply::Nothing);
        }
        if let Some(command) = Command::parse(input) {
            let message = self.execute(command)?;
            return Ok(Reply::Command { command, message });
        }
        let outcome = self.run_turn(input.trim()).await?;
        Ok(Reply::Turn(Box::new(outcome)))
    }

    /// Run one model turn for `user_input`.
    ///
    /// # Errors
    /// Returns [`crate::SessionError::Generation`] when the narrator call
    /// fails, with nothing persisted. Returns [`crate::SessionError::Core`]
    /// before calling the narrator when the world or transcript document is
    /// present but unreadable, and when a document cannot be written.
    pub async fn run_turn(&mut self, user_input: &str) -> Result<TurnOutcome> {
        let mut stages = vec![TurnStage::AwaitingInput];

        let mut world = self.world()?;
        let mut transcript = self.transcript()?;
        let prompts = self.prompts();

        let window = ContextWindow::build(&world, &transcript, &self.story, user_input, &prompts, &self.config)?;
        let snapshot = window.snapshot.clone();
        let request = window.into_request(&self.config);
        debug!(messages = request.messages.len(), system_chars = request.system.len(), "context built");

        let draft = self.narrator.generate(&request).await?;
        stages.push(TurnStage::DraftGenerated);
        let draft_parsed = parser::parse(&draft.text);

        let mut cross_check = None;
        let parsed = match self.editor.as_ref().filter(|_| self.config.cross_check.enabled) {
            Some(editor) => {
                let input = ReviewInput {
                    user_input,
                    draft: &draft.text,
                    draft_parsed: &draft_parsed,
                    snapshot: &snapshot,
                    log_cap: self.config.merge.log_entry_cap,
                };
                let settings = EditorSettings {
                    temperature: self.config.llm.editor_temperature,
                    max_tokens: self.config.llm.max_tokens,
                    timeout_ms: self.config.llm.request_timeout_ms,
                };
                let check = crosscheck::review(editor, &prompts, &input, settings).await;
                let parsed = if check.revised {
                    stages.push(TurnStage::CrossChecked);
                    parser::parse(&check.text)
                } else {
                    draft_parsed
                };
                cross_check = Some(check);
                parsed
            }
            None => draft_parsed,
        };
        stages.push(TurnStage::Parsed);

        let merge = self.apply_directive(&mut world, &parsed)?;
        stages.push(if matches!(merge, MergeStatus::Applied(_)) {
            TurnStage::Merged
        } else {
            TurnStage::MergeSkipped
        });

        let applied = match (&merge, &parsed.directive) {
            (MergeStatus::Applied(_), Some(directive)) => Some(directive.to_value()),
            _ => None,
        };
        let revised = cross_check.as_ref().is_some_and(|c| c.revised);
        let final_raw = cross_check
            .as_ref()
            .filter(|c| c.revised)
            .map_or_else(|| draft.text.clone(), |c| c.text.clone());
        let draft_raw = revised.then(|| draft.text.clone());

        transcript.push(ConversationTurn::user(user_input));
        transcript.push(
            ConversationTurn::assistant(parsed.narrative.clone())
                .with_debug_json(applied)
                .with_raw(draft_raw, Some(final_raw)),
        );
        self.store.save(&self.config.store.transcript_file, &transcript)?;
        self.story.push(parsed.narrative.clone());
        stages.push(TurnStage::Persisted);

        info!(
            turn = transcript.len() / 2,
            merged = matches!(merge, MergeStatus::Applied(_)),
            cross_checked = revised,
            time = %world.world.current_time,
            "turn persisted"
        );

        Ok(TurnOutcome {
            narrative: parsed.narrative,
            stages,
            directive: parsed.directive,
            merge,
            cross_check,
            world_time: world.world.current_time,
        })
    }
}

impl<G> Session<G> {
    /// Merge the parsed directive into `world` and save it. A directive
    /// that cannot be applied leaves both `world` and the file untouched.
    fn apply_directive(&self, world: &mut WorldState, parsed: &ParsedResponse) -> Result<MergeStatus> {
        let directive = match (&parsed.directive, &parsed.malformed) {
            (Some(directive), _) => directive,
            (None, Some(reason)) => return Ok(MergeStatus::Malformed(reason.clone())),
            (None, None) => return Ok(MergeStatus::NoDirective),
        };
        match self.engine.merge(world, directive) {
            Ok((next, report)) => {
                self.store.save(&self.config.store.world_file, &next)?;
                *world = next;
                Ok(MergeStatus::Applied(report))
            }
            Err(e) => {
                warn!(error = %e, "directive not applied");
                Ok(MergeStatus::Rejected(describe(&e)))
            }
        }
    }
}

fn describe(error: &LogposeError) -> String {
    match error {
        LogposeError::MalformedTimestamp { value } => {
            format!("world clock '{value}' is not YYYY-MM-DD HH:MM:SS; fix it in the world file")
        }
        other => other.to_string(),
    }
}
