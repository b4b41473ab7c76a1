//! Prompt templates for the narrator and the cross-check editor.
//!
//! Built-in templates live here; a session's `prompts.json` document may
//! override any of them by key. Placeholders are `{name}` and are filled in
//! a single pass by [`render_template`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Narrator instructions: rules, output contract and the state snapshot.
pub const NARRATOR_SYSTEM: &str = r#"Role: Game Master of a One Piece text RPG. Strict logic, vivid prose.

[HARD RULES]
1. Inventory before use: the player can only use, eat, give or sell items listed in Player.inventory.
2. Travel follows connections: the player can only move to a location listed in the current location's connections. Otherwise describe why they cannot.
3. No god mode: outcomes respect the player's stats, level and the caps in Settings. Reckless actions fail and cost HP.
4. Time: every action takes time; use Settings.action_costs when it lists the action.
5. Never change the meaning of existing keys. Arrays (inventory, crew, abilities) must be sent COMPLETE, not as a diff.
6. Log: only significant events, at most {log_cap} characters.

[OUTPUT FORMAT]
Write the narrative first, in the player's language. Then write exactly one fenced block:
```json
{
  "time_passed": {"days": 0, "hours": 0, "minutes": 0},
  "log_entry": "...",
  "player": {},
  "world": {},
  "characters": {},
  "locations": {},
  "unique_items": {}
}
```
Omit sections that did not change. Stats and reputation may list only the keys that changed.

[PREVIOUS STORY]
{recent_story}

[CONTEXT]
Player: {player}
World: {world}
Current location ({location_name}): {location}
Settings: {settings}
Characters: {characters}"#;

/// Editor instructions for the cross-check pass.
pub const EDITOR_SYSTEM: &str = r#"Role: Continuity editor for a One Piece text RPG.
You receive a draft turn written by the Game Master: narrative text followed by one fenced json block of state changes.

[YOUR JOB]
1. Check the draft against the rules and the state below: items must be in the inventory before use, travel must follow connections, outcomes must respect stats and the caps in Settings.
2. Improve tone and prose where needed, in the same language as the draft.
3. If you change the OUTCOME of the narrative, revise the json block so it matches the new narrative (HP, inventory, location, friendship, time).
4. Log entries are at most {log_cap} characters.

[OUTPUT FORMAT]
Return the full revised turn in the same format as the draft: narrative first, then exactly one fenced ```json block. No commentary about your edits.

[STATE]
Player: {player}
Current location ({location_name}): {location}
Settings: {settings}
Characters: {characters}"#;

/// Editor input: the player's action and the narrator's draft.
pub const EDITOR_USER: &str = r"Player action:
{user_input}

Draft turn:
{draft}";

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Narrator system prompt.
    NarratorSystem,
    /// Editor system prompt.
    EditorSystem,
    /// Editor user message.
    EditorUser,
}

impl PromptId {
    /// Key of this template in `prompts.json`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::NarratorSystem => "narrator_system",
            Self::EditorSystem => "editor_system",
            Self::EditorUser => "editor_user",
        }
    }

    /// Built-in text.
    #[must_use]
    pub fn builtin(self) -> &'static str {
        match self {
            Self::NarratorSystem => NARRATOR_SYSTEM,
            Self::EditorSystem => EDITOR_SYSTEM,
            Self::EditorUser => EDITOR_USER,
        }
    }

    /// Placeholders the caller fills for this template.
    #[must_use]
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            Self::NarratorSystem => &[
                "player",
                "world",
                "location_name",
                "location",
                "settings",
                "characters",
                "recent_story",
                "log_cap",
            ],
            Self::EditorSystem => &["player", "location_name", "location", "settings", "characters", "log_cap"],
            Self::EditorUser => &["user_input", "draft"],
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[Self::NarratorSystem, Self::EditorSystem, Self::EditorUser]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fill `{key}` placeholders from `vars` in one pass.
///
/// Substituted values are not rescanned, so a snapshot that happens to
/// contain `{world}` stays intact. Unknown placeholders are left as is.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// The set of templates a session renders from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBook {
    /// Narrator system prompt. `system_prompt` is accepted too.
    #[serde(default = "default_narrator_system", alias = "system_prompt")]
    pub narrator_system: String,
    /// Editor system prompt.
    #[serde(default = "default_editor_system")]
    pub editor_system: String,
    /// Editor user message.
    #[serde(default = "default_editor_user")]
    pub editor_user: String,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self {
            narrator_system: default_narrator_system(),
            editor_system: default_editor_system(),
            editor_user: default_editor_user(),
        }
    }
}

impl PromptBook {
    /// Book from a loaded `prompts.json` document. Keys it lacks, and the
    /// whole document if it is not an object of strings, fall back to the
    /// built-ins.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        match Self::deserialize(value) {
            Ok(book) => {
                for id in PromptId::all() {
                    let text = book.template(*id);
                    for name in id.placeholders() {
                        if !text.contains(&format!("{{{name}}}")) {
                            warn!(prompt = %id, placeholder = name, "prompt template omits a placeholder");
                        }
                    }
                }
                book
            }
            Err(e) => {
                warn!(error = %e, "prompt document unusable, using built-in templates");
                Self::default()
            }
        }
    }

    /// Template text for `id`.
    #[must_use]
    pub fn template(&self, id: PromptId) -> &str {
        match id {
            PromptId::NarratorSystem => &self.narrator_system,
            PromptId::EditorSystem => &self.editor_system,
            PromptId::EditorUser => &self.editor_user,
        }
    }

    /// Render template `id` with `vars`.
    #[must_use]
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> String {
        render_template(self.template(id), vars)
    }
}

fn default_narrator_system() -> String {
    NARRATOR_SYSTEM.to_string()
}
fn default_editor_system() -> String {
    EDITOR_SYSTEM.to_string()
}
fn default_editor_user() -> String {
    EDITOR_USER.to_string()
}
