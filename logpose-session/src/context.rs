//! Context window builder.
//!
//! The model is stateless between calls, so every turn it receives the
//! full rules, the output contract and a fresh snapshot of the world,
//! plus a bounded window of the conversation.

use logpose_core::config::LogposeConfig;
use logpose_core::transcript::{Role, StoryBuffer, Transcript};
use logpose_core::{Result, WorldState};
use logpose_llm::prompt::{PromptBook, PromptId};
use logpose_llm::{ChatMessage, LlmRequest};

/// Serialized pieces of the world that prompts embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// `player` as JSON.
    pub player: String,
    /// `world` as JSON.
    pub world: String,
    /// Key of the player's current location.
    pub location_name: String,
    /// The current location entity as JSON, `{}` when unknown.
    pub location: String,
    /// `settings` as JSON.
    pub settings: String,
    /// `characters` as JSON.
    pub characters: String,
}

impl Snapshot {
    /// Snapshot `world`.
    ///
    /// # Errors
    /// Returns a serialization error if a section cannot be rendered.
    pub fn of(world: &WorldState) -> Result<Self> {
        let location = match world.current_location() {
            Some(location) => serde_json::to_string(location)?,
            None => "{}".to_string(),
        };
        Ok(Self {
            player: serde_json::to_string(&world.player)?,
            world: serde_json::to_string(&world.world)?,
            location_name: world.player.current_location.clone(),
            location,
            settings: serde_json::to_string(&world.settings)?,
            characters: serde_json::to_string(&world.characters)?,
        })
    }

    /// Placeholder bindings shared by the narrator and editor templates.
    #[must_use]
    pub fn vars<'a>(&'a self, log_cap: &'a str) -> Vec<(&'static str, &'a str)> {
        vec![
            ("player", self.player.as_str()),
            ("world", self.world.as_str()),
            ("location_name", self.location_name.as_str()),
            ("location", self.location.as_str()),
            ("settings", self.settings.as_str()),
            ("characters", self.characters.as_str()),
            ("log_cap", log_cap),
        ]
    }
}

/// What gets sent to the narrator for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    /// Rendered system instructions.
    pub system: String,
    /// Prior turns, oldest first, ending with the new user input.
    pub messages: Vec<ChatMessage>,
    /// The snapshot the instructions were rendered from.
    pub snapshot: Snapshot,
}

impl ContextWindow {
    /// Build the window for `user_input`.
    ///
    /// # Errors
    /// Returns a serialization error if the world cannot be rendered.
    pub fn build(
        world: &WorldState,
        transcript: &Transcript,
        story: &StoryBuffer,
        user_input: &str,
        prompts: &PromptBook,
        config: &LogposeConfig,
    ) -> Result<Self> {
        let snapshot = Snapshot::of(world)?;
        let log_cap = config.merge.log_entry_cap.to_string();
        let recent_story = if story.is_empty() {
            "(none yet)".to_string()
        } else {
            story.iter().collect::<Vec<_>>().join("\n---\n")
        };

        let mut vars = snapshot.vars(&log_cap);
        vars.push(("recent_story", recent_story.as_str()));
        let system = prompts.render(PromptId::NarratorSystem, &vars);

        let mut messages: Vec<ChatMessage> = transcript
            .window(config.context.window_turns)
            .iter()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::user(turn.content.clone()),
                Role::Assistant => ChatMessage::assistant(turn.content.clone()),
            })
            .collect();
        messages.push(ChatMessage::user(user_input));

        Ok(Self {
            system,
            messages,
            snapshot,
        })
    }

    /// Narrator request with the configured sampling and timeout.
    #[must_use]
    pub fn into_request(self, config: &LogposeConfig) -> LlmRequest {
        LlmRequest::new(self.system, self.messages)
            .with_temperature(config.llm.narrator_temperature)
            .with_max_tokens(config.llm.max_tokens)
            .with_timeout(config.llm.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpose_core::transcript::ConversationTurn;
    use logpose_llm::ChatRole;
    use serde_json::json;

    fn world() -> WorldState {
        serde_json::from_value(json!({
            "player": {"name": "Luffy", "current_location": "Harbor", "inventory": ["Meat"]},
            "locations": {"Harbor": {"connections": ["Foosha Village"]}},
            "characters": {"Makino": {"friendship": 10}},
            "settings": {"action_costs": {"walk": 30}}
        }))
        .expect("fixture parses")
    }

    #[test]
    fn window_is_last_turns_plus_input() {
        let mut transcript = Transcript::new();
        for i in 0..5 {
            transcript.push(ConversationTurn::user(format!("u{i}")));
            transcript.push(ConversationTurn::assistant(format!("a{i}")));
        }
        let config = LogposeConfig::default();
        let window = ContextWindow::build(
            &world(),
            &transcript,
            &StoryBuffer::new(3),
            "look around",
            &PromptBook::default(),
            &config,
        )
        .expect("build");
        assert_eq!(window.messages.len(), config.context.window_turns + 1);
        assert_eq!(window.messages[0].content, "u2");
        assert_eq!(window.messages[0].role, ChatRole::User);
        let last = window.messages.last().expect("input");
        assert_eq!((last.role, last.content.as_str()), (ChatRole::User, "look around"));
    }

    #[test]
    fn system_prompt_embeds_snapshot_and_story() {
        let mut story = StoryBuffer::new(3);
        story.push("You ate meat.");
        let window = ContextWindow::build(
            &world(),
            &Transcript::new(),
            &story,
            "go",
            &PromptBook::default(),
            &LogposeConfig::default(),
        )
        .expect("build");
        assert!(window.system.contains(r#""inventory":["Meat"]"#));
        assert!(window.system.contains("Current location (Harbor)"));
        assert!(window.system.contains(r#"{"connections":["Foosha Village"]}"#));
        assert!(window.system.contains(r#""walk":30"#));
        assert!(window.system.contains("You ate meat."));
        assert!(window.system.contains("at most 150 characters"));
        assert_eq!(window.messages.len(), 1);
    }

    #[test]
    fn unknown_location_renders_empty_object() {
        let mut state = world();
        state.player.current_location = "Nowhere".into();
        let snapshot = Snapshot::of(&state).expect("snapshot");
        assert_eq!(snapshot.location, "{}");
        assert_eq!(snapshot.location_name, "Nowhere");
    }

    #[test]
    fn request_uses_configured_sampling() {
        let mut config = LogposeConfig::default();
        config.llm.request_timeout_ms = 1234;
        let request = ContextWindow::build(
            &world(),
            &Transcript::new(),
            &StoryBuffer::new(3),
            "go",
            &PromptBook::default(),
            &config,
        )
        .expect("build")
        .into_request(&config);
        assert_eq!(request.timeout_ms, 1234);
        assert_eq!(request.max_tokens, config.llm.max_tokens);
    }
}
