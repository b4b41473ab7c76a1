//! The world document and the entities inside it.
//!
//! Every struct keeps keys it does not model in a flattened `extra` map,
//! so a load → save round trip never drops fields the author or the
//! model added to the JSON file.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::clock::DEFAULT_START_TIME;

/// Keys an entity carries that are not modelled by its struct.
pub type Extra = Map<String, Value>;

/// Root world document, persisted as `db.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldState {
    /// The single player character.
    #[serde(default, deserialize_with = "player_document")]
    pub player: Player,
    /// Clock, milestones and world events.
    #[serde(default)]
    pub world: WorldSection,
    /// Known NPCs keyed by unique name. Grows as NPCs are discovered.
    #[serde(default)]
    pub characters: BTreeMap<String, Character>,
    /// Known locations keyed by name. Grows as places are discovered.
    #[serde(default)]
    pub locations: BTreeMap<String, Location>,
    /// Notable items keyed by name.
    #[serde(default)]
    pub unique_items: Map<String, Value>,
    /// Short event strings, oldest first.
    #[serde(default)]
    pub log: Vec<String>,
    /// Static rules (action costs, power caps...). Never written by a merge.
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Unmodelled top-level keys.
    #[serde(flatten)]
    pub extra: Extra,
}

impl WorldState {
    /// The location entity the player is standing in, if it is known.
    #[must_use]
    pub fn current_location(&self) -> Option<&Location> {
        self.locations.get(&self.player.current_location)
    }

    /// Most recent log entry.
    #[must_use]
    pub fn last_log(&self) -> Option<&str> {
        self.log.last().map(String::as_str)
    }

    /// Player hit points, when recorded as a number.
    #[must_use]
    pub fn player_hp(&self) -> Option<i64> {
        self.player.stats.get("hp").and_then(Value::as_i64)
    }

    /// Whether `player.current_location` names a key of `locations`.
    ///
    /// Travel is decided by the model; this is only reported, never enforced.
    #[must_use]
    pub fn location_is_known(&self) -> bool {
        self.locations.contains_key(&self.player.current_location)
    }
}

/// The `world` subtree: absolute clock plus narrative bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSection {
    /// Absolute in-world time, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default = "default_start_time")]
    pub current_time: String,
    /// Ordered milestone strings.
    #[serde(default)]
    pub timeline: Vec<Value>,
    /// Free-form world events.
    #[serde(default)]
    pub events: Map<String, Value>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            current_time: default_start_time(),
            timeline: Vec::new(),
            events: Map::new(),
            extra: Extra::new(),
        }
    }
}

/// The player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Player {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Key into [`WorldState::locations`]. `location` is accepted on load.
    #[serde(default, alias = "location")]
    pub current_location: String,
    /// Item names, in the order the model listed them.
    #[serde(default)]
    pub inventory: Vec<String>,
    /// hp, stamina, strength, speed, bounty...
    #[serde(default)]
    pub stats: Map<String, Value>,
    /// Faction → standing.
    #[serde(default, deserialize_with = "lenient_i64_map")]
    pub reputation: BTreeMap<String, i64>,
    /// Race, description, abilities.
    #[serde(default)]
    pub traits: Traits,
    /// Devil fruit details.
    #[serde(default)]
    pub devil_fruit: Map<String, Value>,
    /// Haki proficiencies.
    #[serde(default)]
    pub haki: Map<String, Value>,
    /// Ship or other vehicle.
    #[serde(default)]
    pub vehicle: Vehicle,
    /// Crew members (names or descriptor objects).
    #[serde(default)]
    pub crew: Vec<Value>,
    /// Character level.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub level: i64,
    /// Experience points.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub exp: i64,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Innate player traits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Traits {
    /// Race.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Abilities; replaced wholesale on update.
    #[serde(default)]
    pub abilities: Vec<Value>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// The player's vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Vehicle {
    /// Vehicle name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hull, sails, supplies...; union-merged on update.
    #[serde(default)]
    pub status: Map<String, Value>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// A non-player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Character {
    /// Alive, injured, ally, hostile...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Where the NPC currently is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Per-NPC stats; union-merged on update.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub stats: Map<String, Value>,
    /// Per-NPC faction standing; union-merged on update.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub reputation: Map<String, Value>,
    /// Relationship with the player, kept within the configured bounds.
    #[serde(default, deserialize_with = "lenient_opt_i64", skip_serializing_if = "Option::is_none")]
    pub friendship: Option<i64>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// A place the player can be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names of directly reachable locations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<String>,
    /// Unmodelled keys.
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_start_time() -> String {
    DEFAULT_START_TIME.to_string()
}

/// Older documents carry `location`, sometimes next to `current_location`.
/// The canonical key wins when both are present.
fn player_document<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Player, D::Error> {
    let mut doc = Map::<String, Value>::deserialize(deserializer)?;
    if let Some(location) = doc.remove("location") {
        let canonical_set = doc
            .get("current_location")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !canonical_set {
            doc.insert("current_location".to_string(), location);
        }
    }
    serde_json::from_value(Value::Object(doc)).map_err(D::Error::custom)
}

/// Read a whole number from JSON the model or an author wrote loosely:
/// `2.0`, `1.5` and `"30"` all count. Fractions are truncated toward zero.
#[allow(clippy::cast_possible_truncation)]
fn integer<E: serde::de::Error>(value: &Value) -> Result<Option<i64>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| E::custom(format!("integer out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| E::custom(format!("not an integer: '{s}'"))),
        other => Err(E::custom(format!("not an integer: {other}"))),
    }
}

/// Lenient integer; `null` reads as zero.
pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(integer::<D::Error>(&value)?.unwrap_or(0))
}

/// Lenient optional integer; `null` reads as absent.
fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    integer(&value)
}

/// Map of lenient integers; `null` entries read as zero.
fn lenient_i64_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error> {
    let Some(raw) = Option::<Map<String, Value>>::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    raw.into_iter()
        .map(|(key, value)| integer::<D::Error>(&value).map(|n| (key, n.unwrap_or(0))))
        .collect()
}
