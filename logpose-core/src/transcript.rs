//! Conversation transcript and the bounded windows cut from it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The player.
    User,
    /// The narrator model.
    Assistant,
}

/// One entry of the transcript document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker.
    pub role: Role,
    /// Text shown to the player (narrative only, never the directive).
    pub content: String,
    /// The directive that was actually applied this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_json: Option<Value>,
    /// Raw narrator output, kept for audit when a cross-check ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_raw: Option<String>,
    /// Raw text the turn was finally parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_raw: Option<String>,
}

impl ConversationTurn {
    /// A player turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            debug_json: None,
            draft_raw: None,
            final_raw: None,
        }
    }

    /// A narrator turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            debug_json: None,
            draft_raw: None,
            final_raw: None,
        }
    }

    /// Attach the applied directive.
    #[must_use]
    pub fn with_debug_json(mut self, directive: Option<Value>) -> Self {
        self.debug_json = directive;
        self
    }

    /// Attach raw model text for audit.
    #[must_use]
    pub fn with_raw(mut self, draft: Option<String>, final_text: Option<String>) -> Self {
        self.draft_raw = draft;
        self.final_raw = final_text;
        self
    }
}

/// Append-only turn list, persisted as a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The most recent `n` turns, oldest first.
    #[must_use]
    pub fn window(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// All turns.
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Fixed-capacity ring of recent narratives, owned by a session.
#[derive(Debug, Clone)]
pub struct StoryBuffer {
    capacity: usize,
    entries: VecDeque<String>,
}

impl StoryBuffer {
    /// Buffer holding at most `capacity` narratives.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a narrative, evicting the oldest when full.
    pub fn push(&mut self, narrative: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(narrative.into());
    }

    /// Narratives, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of buffered narratives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_returns_latest_turns_in_order() {
        let mut transcript = Transcript::new();
        for i in 0..10 {
            transcript.push(ConversationTurn::user(format!("turn {i}")));
        }
        let window = transcript.window(6);
        assert_eq!(window.len(), 6);
        assert_eq!(window[0].content, "turn 4");
        assert_eq!(window[5].content, "turn 9");
    }

    #[test]
    fn window_larger_than_transcript() {
        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::user("only"));
        assert_eq!(transcript.window(6).len(), 1);
        assert!(Transcript::new().window(6).is_empty());
    }

    #[test]
    fn transcript_serializes_as_plain_array() {
        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::user("go north"));
        transcript.push(
            ConversationTurn::assistant("You walk north.")
                .with_debug_json(Some(serde_json::json!({"log_entry": "walked"}))),
        );
        let value = serde_json::to_value(&transcript).expect("serializes");
        assert!(value.is_array());
        assert_eq!(value[0]["role"], "user");
        assert!(value[0].get("debug_json").is_none());
        assert_eq!(value[1]["debug_json"]["log_entry"], "walked");
    }

    #[test]
    fn story_buffer_evicts_oldest() {
        let mut buffer = StoryBuffer::new(3);
        for s in ["a", "b", "c", "d"] {
            buffer.push(s);
        }
        assert_eq!(buffer.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn zero_capacity_buffer_stays_empty() {
        let mut buffer = StoryBuffer::new(0);
        buffer.push("a");
        assert!(buffer.is_empty());
    }
}
