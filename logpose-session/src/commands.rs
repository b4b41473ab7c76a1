//! Literal commands handled without calling the model.

use logpose_core::WorldState;

/// A recognised command phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Wipe the transcript and the story buffer.
    ClearStory,
    /// Restore the world from its backup, then wipe the story.
    ResetWorld,
    /// Show the HUD line.
    Status,
}

const CLEAR_PHRASES: &[&str] = &["clear", "reset story", "ล้างแชท"];
const RESET_WORLD_PHRASES: &[&str] = &["reset world", "reset all"];
const STATUS_PHRASES: &[&str] = &["status"];

impl Command {
    /// Match `input` against the command phrases, ignoring case and
    /// surrounding whitespace. Anything else is a turn for the model.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let phrase = input.trim().to_lowercase();
        let phrase = phrase.as_str();
        if CLEAR_PHRASES.contains(&phrase) {
            Some(Self::ClearStory)
        } else if RESET_WORLD_PHRASES.contains(&phrase) {
            Some(Self::ResetWorld)
        } else if STATUS_PHRASES.contains(&phrase) {
            Some(Self::Status)
        } else {
            None
        }
    }
}

/// One-line summary of the player's situation.
#[must_use]
pub fn hud(world: &WorldState) -> String {
    let name = if world.player.name.is_empty() {
        "(unnamed)"
    } else {
        world.player.name.as_str()
    };
    let location = if world.player.current_location.is_empty() {
        "(nowhere)"
    } else {
        world.player.current_location.as_str()
    };
    let hp = match (world.player_hp(), world.player.stats.get("max_hp").and_then(serde_json::Value::as_i64)) {
        (Some(hp), Some(max)) => format!("{hp}/{max}"),
        (Some(hp), None) => hp.to_string(),
        (None, _) => "?".to_string(),
    };
    let mut line = format!("{name} | {location} | {} | HP {hp}", world.world.current_time);
    if let Some(last) = world.last_log() {
        line.push_str(" | Last: ");
        line.push_str(last);
    }
    line
}
