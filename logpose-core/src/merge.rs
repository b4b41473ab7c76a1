//! State merge engine.
//!
//! A [`Directive`] is folded into a [`WorldState`] by walking declarative
//! rule tables. Each field names one [`MergePolicy`]; a single generic
//! [`apply_policy`] interprets them over the JSON form of the world.
//!
//! | Field | Policy |
//! |---|---|
//! | `player.inventory`, `crew`, `traits.abilities` | replace |
//! | `player.current_location`, `level`, `exp` | replace |
//! | `player.stats`, `reputation`, `devil_fruit`, `haki` | union-merge |
//! | `player.vehicle.status` | union-merge |
//! | `world.timeline`, `world.events` | replace |
//! | `world.current_time` | preserved (owned by the clock) |
//! | `characters.<name>` | insert new / merge existing |
//! | `locations`, `unique_items` | union-merge at the top level |
//! | `log_entry` | appended to `log`, truncated |
//!
//! Keys without a rule are replaced. The merged JSON is re-validated by
//! deserializing it back into [`WorldState`]; if that fails, or the clock
//! cannot advance, the merge is rejected and the input state is untouched.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clock;
use crate::config::MergeConfig;
use crate::error::{LogposeError, Result};
use crate::parser::Directive;
use crate::types::WorldState;

/// How an incoming value combines with the stored one.
#[derive(Debug, Clone, Copy)]
pub enum MergePolicy {
    /// Incoming value overwrites the stored one.
    Replace,
    /// Incoming keys overwrite; stored keys absent from the update survive.
    UnionMerge,
    /// Incoming value is pushed onto the stored sequence.
    Append,
    /// Keyed entity map: unknown keys are inserted verbatim, known keys are
    /// merged field by field under the given rules.
    Insert(&'static [FieldRule]),
    /// Nested object merged field by field under its own rules.
    Fields(&'static [FieldRule]),
    /// Stored value kept, incoming value dropped.
    Preserve,
}

/// One row of a rule table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Object key the rule applies to.
    pub key: &'static str,
    /// Policy for that key.
    pub policy: MergePolicy,
}

const fn rule(key: &'static str, policy: MergePolicy) -> FieldRule {
    FieldRule { key, policy }
}

/// `player.vehicle`.
pub const VEHICLE_RULES: &[FieldRule] = &[rule("status", MergePolicy::UnionMerge)];

/// `player.traits`.
pub const TRAITS_RULES: &[FieldRule] = &[rule("abilities", MergePolicy::Replace)];

/// `player`.
pub const PLAYER_RULES: &[FieldRule] = &[
    rule("inventory", MergePolicy::Replace),
    rule("current_location", MergePolicy::Replace),
    rule("stats", MergePolicy::UnionMerge),
    rule("reputation", MergePolicy::UnionMerge),
    rule("vehicle", MergePolicy::Fields(VEHICLE_RULES)),
    rule("devil_fruit", MergePolicy::UnionMerge),
    rule("haki", MergePolicy::UnionMerge),
    rule("crew", MergePolicy::Replace),
    rule("traits", MergePolicy::Fields(TRAITS_RULES)),
    rule("level", MergePolicy::Replace),
    rule("exp", MergePolicy::Replace),
];

/// `world`.
pub const WORLD_RULES: &[FieldRule] = &[
    rule("current_time", MergePolicy::Preserve),
    rule("timeline", MergePolicy::Replace),
    rule("events", MergePolicy::Replace),
];

/// An existing `characters.<name>` entry.
pub const CHARACTER_RULES: &[FieldRule] = &[
    rule("status", MergePolicy::Replace),
    rule("location", MergePolicy::Replace),
    rule("friendship", MergePolicy::Replace),
    rule("stats", MergePolicy::UnionMerge),
    rule("reputation", MergePolicy::UnionMerge),
];

/// Top-level sections a directive may touch. `settings` is absent on purpose.
pub const ROOT_RULES: &[FieldRule] = &[
    rule("player", MergePolicy::Fields(PLAYER_RULES)),
    rule("world", MergePolicy::Fields(WORLD_RULES)),
    rule("characters", MergePolicy::Insert(CHARACTER_RULES)),
    rule("locations", MergePolicy::UnionMerge),
    rule("unique_items", MergePolicy::UnionMerge),
];

fn lookup(rules: &[FieldRule], key: &str) -> MergePolicy {
    rules
        .iter()
        .find(|r| r.key == key)
        .map_or(MergePolicy::Replace, |r| r.policy)
}

/// What a merge did, for logs and the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Dotted paths that received a value.
    pub applied: Vec<String>,
    /// Characters inserted as new entities.
    pub inserted: Vec<String>,
    /// Dotted paths whose incoming value was dropped, with the reason.
    pub skipped: Vec<String>,
    /// Dotted paths pulled back into range.
    pub clamped: Vec<String>,
    /// Whether a log line was appended.
    pub log_appended: bool,
    /// Old log lines dropped by retention.
    pub evicted_log_entries: usize,
    /// Clock after the merge.
    pub world_time: String,
}

/// Apply `policy` for `incoming` onto `target`, recording into `report`.
pub fn apply_policy(
    policy: MergePolicy,
    target: &mut Value,
    incoming: Value,
    path: &str,
    report: &mut MergeReport,
) {
    match policy {
        MergePolicy::Replace => {
            *target = incoming;
            report.applied.push(path.to_string());
        }
        MergePolicy::Preserve => {
            debug!(path, "incoming value ignored; field is not writable by directives");
            report.skipped.push(format!("{path} (not writable)"));
        }
        MergePolicy::UnionMerge => {
            let Value::Object(updates) = incoming else {
                report.skipped.push(format!("{path} (expected an object)"));
                return;
            };
            let stored = ensure_object(target);
            for (key, value) in updates {
                stored.insert(key, value);
            }
            report.applied.push(path.to_string());
        }
        MergePolicy::Append => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                match incoming {
                    Value::Array(more) => items.extend(more),
                    single => items.push(single),
                }
            }
            report.applied.push(path.to_string());
        }
        MergePolicy::Fields(rules) => {
            let Value::Object(updates) = incoming else {
                report.skipped.push(format!("{path} (expected an object)"));
                return;
            };
            let stored = ensure_object(target);
            for (key, value) in updates {
                let child_path = format!("{path}.{key}");
                let slot = stored.entry(key.clone()).or_insert(Value::Null);
                apply_policy(lookup(rules, &key), slot, value, &child_path, report);
            }
        }
        MergePolicy::Insert(rules) => {
            let Value::Object(entities) = incoming else {
                report.skipped.push(format!("{path} (expected an object)"));
                return;
            };
            let stored = ensure_object(target);
            for (name, entity) in entities {
                let child_path = format!("{path}.{name}");
                match stored.get_mut(&name) {
                    Some(existing) if existing.is_object() => {
                        apply_policy(MergePolicy::Fields(rules), existing, entity, &child_path, report);
                    }
                    _ => {
                        if !entity.is_object() {
                            report.skipped.push(format!("{child_path} (expected an object)"));
                            continue;
                        }
                        debug!(path = %child_path, "new entity inserted");
                        stored.insert(name.clone(), entity);
                        report.inserted.push(name);
                        report.applied.push(child_path);
                    }
                }
            }
        }
    }
}

fn ensure_object(target: &mut Value) -> &mut Map<String, Value> {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    match target {
        Value::Object(map) => map,
        _ => unreachable!("target was just made an object"),
    }
}

/// Fold `player.location` into the canonical `player.current_location`.
fn canonicalize_player(mut player: Map<String, Value>) -> Map<String, Value> {
    if let Some(location) = player.remove("location") {
        player.entry("current_location").or_insert(location);
    }
    player
}

/// Keep the first `cap` characters (not bytes) of a log line.
#[must_use]
pub fn truncate_chars(entry: &str, cap: usize) -> String {
    entry.chars().take(cap).collect()
}

/// Applies directives to world states under a [`MergeConfig`].
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    /// Engine with the given bounds and retention.
    #[must_use]
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Bounds and retention in effect.
    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Compute the state that results from applying `directive` to `state`.
    ///
    /// # Errors
    /// Returns [`LogposeError::MergeRejected`] when the merged document no
    /// longer fits the world schema, and the clock errors from
    /// [`clock::advance`]. `state` is never modified.
    pub fn merge(&self, state: &WorldState, directive: &Directive) -> Result<(WorldState, MergeReport)> {
        let mut report = MergeReport::default();
        let mut doc = serde_json::to_value(state)?;
        let root = ensure_object(&mut doc);

        for FieldRule { key, policy } in ROOT_RULES {
            let Some(section) = directive_section(directive, key) else {
                continue;
            };
            let section = if *key == "player" {
                canonicalize_player(section)
            } else {
                section
            };
            let slot = root.entry((*key).to_string()).or_insert(Value::Null);
            apply_policy(*policy, slot, Value::Object(section), key, &mut report);
        }

        if let Some(entry) = directive.log_entry.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            let line = truncate_chars(entry, self.config.log_entry_cap);
            let slot = root.entry("log".to_string()).or_insert(Value::Null);
            apply_policy(MergePolicy::Append, slot, Value::String(line), "log", &mut report);
            report.log_appended = true;
        }

        if !directive.extra.is_empty() {
            let keys: Vec<&str> = directive.extra.keys().map(String::as_str).collect();
            debug!(?keys, "directive keys without a merge rule ignored");
        }

        let mut next: WorldState = serde_json::from_value(doc)
            .map_err(|e| LogposeError::MergeRejected(format!("merged world no longer fits schema: {e}")))?;

        self.clamp(&mut next, directive, &mut report);
        report.evicted_log_entries = self.evict_log(&mut next);

        if !directive.time_passed.is_zero() {
            clock::advance(&mut next.world, &directive.time_passed)?;
        }
        report.world_time.clone_from(&next.world.current_time);

        if !next.location_is_known() && !next.player.current_location.is_empty() {
            warn!(
                location = %next.player.current_location,
                "player is at a location missing from the locations table"
            );
        }

        Ok((next, report))
    }

    /// Merge in place; `state` is only replaced when the merge succeeds.
    ///
    /// # Errors
    /// Same as [`MergeEngine::merge`].
    pub fn apply(&self, state: &mut WorldState, directive: &Directive) -> Result<MergeReport> {
        let (next, report) = self.merge(state, directive)?;
        *state = next;
        info!(
            applied = report.applied.len(),
            inserted = report.inserted.len(),
            clamped = report.clamped.len(),
            time = %report.world_time,
            "directive merged"
        );
        Ok(report)
    }

    /// Pull touched values back into their domain ranges.
    fn clamp(&self, state: &mut WorldState, directive: &Directive, report: &mut MergeReport) {
        let (lo, hi) = (self.config.friendship_min, self.config.friendship_max);
        if let Some(touched) = &directive.characters {
            for name in touched.keys() {
                let Some(character) = state.characters.get_mut(name) else {
                    continue;
                };
                if let Some(score) = character.friendship {
                    let bounded = score.clamp(lo, hi);
                    if bounded != score {
                        warn!(character = %name, score, bounded, "friendship out of range, clamped");
                        character.friendship = Some(bounded);
                        report.clamped.push(format!("characters.{name}.friendship"));
                    }
                }
            }
        }

        let touched_stats = directive
            .player
            .as_ref()
            .is_some_and(|p| p.contains_key("stats"));
        if self.config.clamp_hp && touched_stats {
            let stats = &mut state.player.stats;
            let max_hp = stats.get("max_hp").and_then(Value::as_i64);
            if let Some(hp) = stats.get("hp").and_then(Value::as_i64) {
                let bounded = max_hp.map_or(hp.max(0), |max| hp.clamp(0, max.max(0)));
                if bounded != hp {
                    warn!(hp, bounded, "player hp out of range, clamped");
                    stats.insert("hp".to_string(), Value::from(bounded));
                    report.clamped.push("player.stats.hp".to_string());
                }
            }
        }
    }

    /// Drop the oldest log lines beyond the retention limit.
    fn evict_log(&self, state: &mut WorldState) -> usize {
        let excess = state.log.len().saturating_sub(self.config.max_log_entries);
        if excess > 0 {
            state.log.drain(..excess);
            debug!(excess, "old log entries evicted");
        }
        excess
    }
}

fn directive_section(directive: &Directive, key: &str) -> Option<Map<String, Value>> {
    match key {
        "player" => directive.player.clone(),
        "world" => directive.world.clone(),
        "characters" => directive.characters.clone(),
        "locations" => directive.locations.clone(),
        "unique_items" => directive.unique_items.clone(),
        _ => None,
    }
}
