//! A play session: one data directory, one narrator, an optional editor.
//!
//! The session holds no copy of the world or the transcript. Both are
//! re-read from the store at the start of every turn and command, so a
//! document replaced on disk takes effect on the next input.

use logpose_core::config::LogposeConfig;
use logpose_core::store::JsonStore;
use logpose_core::transcript::{StoryBuffer, Transcript};
use logpose_core::{MergeEngine, WorldState};
use logpose_llm::{LlmClient, LlmError, LlmProvider, PromptBook};
use serde_json::Value;
use tracing::info;

use crate::commands::{self, Command};
use crate::error::Result;
use crate::pipeline::TurnOutcome;

/// What an input line produced.
#[derive(Debug)]
pub enum Reply {
    /// The line was a model turn.
    Turn(Box<TurnOutcome>),
    /// The line was a command; the message is for the player.
    Command {
        /// Which command ran.
        command: Command,
        /// Confirmation or HUD text.
        message: String,
    },
    /// Blank input.
    Nothing,
}

/// Session state that outlives a single turn.
pub struct Session<G> {
    pub(crate) config: LogposeConfig,
    pub(crate) store: JsonStore,
    pub(crate) engine: MergeEngine,
    pub(crate) story: StoryBuffer,
    pub(crate) narrator: G,
    pub(crate) editor: Option<G>,
}

impl<G> Session<G> {
    /// Session over `config.store.data_dir` with the given generators.
    /// `editor` is only consulted when `cross_check.enabled` is set.
    #[must_use]
    pub fn new(config: LogposeConfig, narrator: G, editor: Option<G>) -> Self {
        let store = JsonStore::new(config.store.data_dir.clone());
        let engine = MergeEngine::new(config.merge.clone());
        let story = StoryBuffer::new(config.context.recent_story_buffer);
        Self {
            config,
            store,
            engine,
            story,
            narrator,
            editor,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LogposeConfig {
        &self.config
    }

    /// Document store.
    #[must_use]
    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Recent narratives.
    #[must_use]
    pub fn story(&self) -> &StoryBuffer {
        &self.story
    }

    /// Current world document, or a fresh world when there is none yet.
    ///
    /// # Errors
    /// A document that exists but does not parse is an error, never a
    /// fresh world: saving over it would erase the player's state.
    pub fn world(&self) -> Result<WorldState> {
        let world = self.store.load_strict(&self.config.store.world_file)?;
        Ok(world.unwrap_or_default())
    }

    /// Current transcript document, or an empty one when there is none yet.
    ///
    /// # Errors
    /// As for [`Session::world`].
    pub fn transcript(&self) -> Result<Transcript> {
        let transcript = self.store.load_strict(&self.config.store.transcript_file)?;
        Ok(transcript.unwrap_or_else(Transcript::new))
    }

    /// Current prompt templates.
    #[must_use]
    pub fn prompts(&self) -> PromptBook {
        let doc: Value = self.store.load(&self.config.store.prompts_file, Value::Null);
        PromptBook::from_value(&doc)
    }

    /// Run a command.
    ///
    /// # Errors
    /// `ResetWorld` fails with `BackupMissing` when there is no backup; in
    /// that case nothing is wiped. Store write failures are returned as is.
    pub fn execute(&mut self, command: Command) -> Result<String> {
        match command {
            Command::ClearStory => {
                self.clear_story()?;
                info!("story cleared");
                Ok("Story cleared. The world is unchanged.".to_string())
            }
            Command::ResetWorld => {
                self.store
                    .restore_backup(&self.config.store.backup_file, &self.config.store.world_file)?;
                self.clear_story()?;
                info!("world reset from backup");
                Ok("World restored from backup and story cleared.".to_string())
            }
            Command::Status => Ok(commands::hud(&self.world()?)),
        }
    }

    fn clear_story(&mut self) -> Result<()> {
        self.store.save(&self.config.store.transcript_file, &Transcript::new())?;
        self.story.clear();
        Ok(())
    }
}

impl Session<LlmClient> {
    /// Session with HTTP generators built from `config.llm` and
    /// `config.cross_check`. API keys are read from the environment.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown provider or a
    /// missing key.
    pub fn from_config(config: LogposeConfig) -> std::result::Result<Self, LlmError> {
        let llm = &config.llm;
        let narrator = LlmClient::new(
            LlmProvider::from_parts(&llm.provider, &llm.base_url, std::env::var(&llm.api_key_env).ok())?,
            llm.narrator_model.clone(),
            llm.max_retries,
        );

        let editor = if config.cross_check.enabled {
            let cc = &config.cross_check;
            let kind = cc.provider.as_deref().unwrap_or(&llm.provider);
            let base_url = cc.base_url.as_deref().unwrap_or(&llm.base_url);
            let key_env = cc.api_key_env.as_deref().unwrap_or(&llm.api_key_env);
            Some(LlmClient::new(
                LlmProvider::from_parts(kind, base_url, std::env::var(key_env).ok())?,
                llm.editor_model.clone(),
                llm.max_retries,
            ))
        } else {
            None
        };

        Ok(Self::new(config, narrator, editor))
    }
}
