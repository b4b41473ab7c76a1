//! Narrative / directive split.
//!
//! The narrator is asked to write story text followed by exactly one
//! fenced JSON block. That is a request, not a guarantee, so parsing is
//! defensive:
//!
//! - no block → the whole text is narrative, no directive (a valid,
//!   non-mechanical turn);
//! - a block whose interior is not a JSON object → narrative is still
//!   extracted, the directive is discarded and the reason recorded in
//!   [`ParsedResponse::malformed`].
//!
//! Parsing never fails.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use crate::clock::TimePassed;

/// Fence that opens and closes the directive block.
pub const FENCE: &str = "```";

/// Info-string tag expected after the opening fence.
pub const FENCE_TAG: &str = "json";

/// Structured state-change payload embedded in a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Directive {
    /// In-world time that elapsed during the turn.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_passed: TimePassed,
    /// One short line for the world log. `new_log_entry` is accepted too.
    #[serde(default, alias = "new_log_entry", skip_serializing_if = "Option::is_none")]
    pub log_entry: Option<String>,
    /// Model's own one-line summary of the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_summary: Option<String>,
    /// Player field updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Map<String, Value>>,
    /// World field updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<Map<String, Value>>,
    /// NPC inserts and updates keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Map<String, Value>>,
    /// Location inserts and overwrites keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Map<String, Value>>,
    /// Unique item inserts and overwrites keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<Map<String, Value>>,
    /// Anything else the model sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Directive {
    /// JSON form, as recorded in the transcript's `debug_json`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Whether the directive carries no state change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_passed.is_zero()
            && self.log_entry.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.player.is_none()
            && self.world.is_none()
            && self.characters.is_none()
            && self.locations.is_none()
            && self.unique_items.is_none()
    }

    /// Build a directive from a JSON object, lifting a legacy `updates`
    /// wrapper into the top level. Keys already at the top level win.
    ///
    /// # Errors
    /// Returns the serde error when the object does not fit the schema.
    pub fn from_object(mut object: Map<String, Value>) -> serde_json::Result<Self> {
        if let Some(Value::Object(updates)) = object.remove("updates") {
            for (key, value) in updates {
                object.entry(key).or_insert(value);
            }
        }
        serde_json::from_value(Value::Object(object))
    }
}

/// Result of splitting one model response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    /// Text for the player, with the directive block removed.
    pub narrative: String,
    /// The structured payload, when one was found and parsed.
    pub directive: Option<Directive>,
    /// Why a block that was present got discarded.
    pub malformed: Option<String>,
}

impl ParsedResponse {
    /// Whether a fenced block was present in the response.
    #[must_use]
    pub fn had_block(&self) -> bool {
        self.directive.is_some() || self.malformed.is_some()
    }
}

/// Split `raw` into narrative and directive.
#[must_use]
pub fn parse(raw: &str) -> ParsedResponse {
    let Some(block) = find_block(raw) else {
        debug!("no directive block; narrative-only turn");
        return ParsedResponse {
            narrative: raw.trim().to_string(),
            directive: None,
            malformed: None,
        };
    };

    let mut narrative = String::with_capacity(raw.len());
    narrative.push_str(&raw[..block.start]);
    narrative.push_str(&raw[block.end..]);
    let mut narrative = narrative.trim().to_string();

    let (directive, malformed) = match decode(block.body) {
        Ok(directive) => (Some(directive), None),
        Err(reason) => {
            warn!(%reason, "discarding malformed directive block");
            (None, Some(reason))
        }
    };

    if narrative.is_empty() {
        if let Some(summary) = directive.as_ref().and_then(|d| d.narrative_summary.as_deref()) {
            narrative = summary.trim().to_string();
        }
    }

    ParsedResponse {
        narrative,
        directive,
        malformed,
    }
}

/// Byte span of a fenced block and its interior.
struct Block<'a> {
    start: usize,
    end: usize,
    body: &'a str,
}

/// First fenced block tagged `json`, or untagged with an object body.
fn find_block(raw: &str) -> Option<Block<'_>> {
    let mut cursor = 0;
    while let Some(offset) = raw[cursor..].find(FENCE) {
        let start = cursor + offset;
        let after_open = start + FENCE.len();
        let rest = &raw[after_open..];

        let (body_start, tagged) = if rest
            .get(..FENCE_TAG.len())
            .is_some_and(|tag| tag.eq_ignore_ascii_case(FENCE_TAG))
        {
            (after_open + FENCE_TAG.len(), true)
        } else {
            (after_open, false)
        };

        let close = raw[body_start..].find(FENCE)?;
        let body_end = body_start + close;
        let end = body_end + FENCE.len();
        let body = &raw[body_start..body_end];

        if tagged || body.trim_start().starts_with('{') {
            return Some(Block { start, end, body });
        }
        // Some other code block; keep looking after it.
        cursor = end;
    }
    None
}

fn decode(body: &str) -> Result<Directive, String> {
    let value: Value =
        serde_json::from_str(body.trim()).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(object) = value else {
        return Err("directive block is not a JSON object".to_string());
    };
    Directive::from_object(object).map_err(|e| format!("directive does not fit schema: {e}"))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_narrative_and_directive() {
        let parsed = parse("Hello.\n```json\n{\"a\":1}\n```");
        assert_eq!(parsed.narrative, "Hello.");
        let directive = parsed.directive.expect("directive");
        assert_eq!(directive.extra["a"], json!(1));
        assert!(parsed.malformed.is_none());
    }

    #[test]
    fn no_block_is_narrative_only() {
        let raw = "  The sea is calm tonight.\nNothing happens.  ";
        let parsed = parse(raw);
        assert_eq!(parsed.narrative, raw.trim());
        assert!(parsed.directive.is_none());
        assert!(!parsed.had_block());
    }

    #[test]
    fn invalid_interior_keeps_narrative() {
        let parsed = parse("A storm hits.\n```json\n{\"time_passed\": {\"hours\": 2,}\n```\nHold on!");
        assert_eq!(parsed.narrative, "A storm hits.\n\nHold on!");
        assert!(parsed.directive.is_none());
        assert!(parsed.malformed.expect("reason").starts_with("invalid JSON"));
    }

    #[test]
    fn non_object_interior_is_malformed() {
        let parsed = parse("Text\n```json\n[1, 2, 3]\n```");
        assert_eq!(parsed.narrative, "Text");
        assert!(parsed.directive.is_none());
        assert!(parsed.malformed.is_some());
    }

    #[test]
    fn schema_mismatch_is_malformed() {
        let parsed = parse("Text\n```json\n{\"player\": \"Luffy\"}\n```");
        assert!(parsed.directive.is_none());
        assert!(parsed.malformed.expect("reason").contains("schema"));
    }

    #[test]
    fn full_directive_fields() {
        let raw = r#"You buy meat at the market.
```json
{
  "time_passed": {"hours": 1, "minutes": 15},
  "new_log_entry": "Bought meat",
  "player": {"inventory": ["Meat"], "stats": {"stamina": 90}},
  "characters": {"Nami": {"friendship": 10}}
}
```"#;
        let parsed = parse(raw);
        assert_eq!(parsed.narrative, "You buy meat at the market.");
        let d = parsed.directive.expect("directive");
        assert_eq!(d.time_passed, TimePassed::new(0, 1, 15));
        assert_eq!(d.log_entry.as_deref(), Some("Bought meat"));
        assert_eq!(d.player.expect("player")["inventory"], json!(["Meat"]));
        assert!(d.characters.expect("characters").contains_key("Nami"));
    }

    #[test]
    fn legacy_updates_wrapper_is_lifted() {
        let raw = "Story\n```json\n{\"updates\": {\"player\": {\"current_location\": \"Syrup\"}}, \"time_passed\": null}\n```";
        let d = parse(raw).directive.expect("directive");
        assert_eq!(d.player.expect("player")["current_location"], "Syrup");
        assert!(d.time_passed.is_zero());
        assert!(!d.extra.contains_key("updates"));
    }

    #[test]
    fn fence_tag_is_case_insensitive_and_inline() {
        let parsed = parse("Go.```JSON{\"log_entry\":\"x\"}```");
        assert_eq!(parsed.narrative, "Go.");
        assert_eq!(parsed.directive.expect("directive").log_entry.as_deref(), Some("x"));
    }

    #[test]
    fn untagged_object_block_is_accepted() {
        let parsed = parse("Done.\n```\n{\"log_entry\": \"untagged\"}\n```");
        assert_eq!(parsed.narrative, "Done.");
        assert!(parsed.directive.is_some());
    }

    #[test]
    fn unrelated_code_block_is_skipped() {
        let raw = "A sign reads:\n```\nNO PIRATES\n```\nYou ignore it.\n```json\n{\"log_entry\": \"ignored sign\"}\n```";
        let parsed = parse(raw);
        assert!(parsed.narrative.contains("NO PIRATES"));
        assert!(parsed.narrative.ends_with("You ignore it."));
        assert_eq!(
            parsed.directive.expect("directive").log_entry.as_deref(),
            Some("ignored sign")
        );
    }

    #[test]
    fn unterminated_block_is_narrative() {
        let raw = "Cliffhanger...\n```json\n{\"log_entry\": \"cut off";
        let parsed = parse(raw);
        assert_eq!(parsed.narrative, raw.trim());
        assert!(parsed.directive.is_none());
        assert!(parsed.malformed.is_none());
    }

    #[test]
    fn summary_fills_empty_narrative() {
        let parsed = parse("```json\n{\"narrative_summary\": \"You rest.\", \"time_passed\": {\"hours\": 8}}\n```");
        assert_eq!(parsed.narrative, "You rest.");
    }

    #[test]
    fn only_first_block_is_removed() {
        let raw = "A\n```json\n{\"log_entry\": \"one\"}\n```\nB\n```json\n{\"log_entry\": \"two\"}\n```";
        let parsed = parse(raw);
        assert_eq!(parsed.directive.expect("directive").log_entry.as_deref(), Some("one"));
        assert!(parsed.narrative.contains("\"two\""));
    }

    #[test]
    fn empty_directive_detection() {
        let d = Directive::default();
        assert!(d.is_empty());
        let d = Directive {
            log_entry: Some("x".into()),
            ..Directive::default()
        };
        assert!(!d.is_empty());
    }
}
