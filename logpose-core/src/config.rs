//! Configuration for a logpose session.
//!
//! Maps directly to `logpose.toml`. Every section is optional; a missing
//! file or section falls back to the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogposeConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Where the persistent documents live.
    #[serde(default)]
    pub store: StoreConfig,
    /// Context window sizing.
    #[serde(default)]
    pub context: ContextConfig,
    /// Merge bounds and retention.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Primary (narrator) generation service.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Optional second-opinion editor pass.
    #[serde(default)]
    pub cross_check: CrossCheckConfig,
}

impl LogposeConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `LogposeError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::LogposeError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Locations of the persistent JSON documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding every document.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// World/player document.
    #[serde(default = "default_world_file")]
    pub world_file: String,
    /// Dialogue transcript document.
    #[serde(default = "default_transcript_file")]
    pub transcript_file: String,
    /// Prompt template document.
    #[serde(default = "default_prompts_file")]
    pub prompts_file: String,
    /// Pristine world snapshot used by `reset world`.
    #[serde(default = "default_backup_file")]
    pub backup_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            world_file: default_world_file(),
            transcript_file: default_transcript_file(),
            prompts_file: default_prompts_file(),
            backup_file: default_backup_file(),
        }
    }
}

/// Context window sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Prior turns sent back to the model as conversational memory.
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,
    /// Recent narratives kept for the "previous story" prompt section.
    #[serde(default = "default_recent_story_buffer")]
    pub recent_story_buffer: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_turns: default_window_turns(),
            recent_story_buffer: default_recent_story_buffer(),
        }
    }
}

/// Merge bounds and retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Lowest friendship score an NPC can hold.
    #[serde(default = "default_friendship_min")]
    pub friendship_min: i64,
    /// Highest friendship score an NPC can hold.
    #[serde(default = "default_friendship_max")]
    pub friendship_max: i64,
    /// Clamp `player.stats.hp` into `[0, max_hp]`.
    #[serde(default = "default_true")]
    pub clamp_hp: bool,
    /// Log entries kept; the oldest are evicted beyond this.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
    /// Maximum characters kept from a directive's log entry.
    #[serde(default = "default_log_entry_cap")]
    pub log_entry_cap: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            friendship_min: default_friendship_min(),
            friendship_max: default_friendship_max(),
            clamp_hp: true,
            max_log_entries: default_max_log_entries(),
            log_entry_cap: default_log_entry_cap(),
        }
    }
}

/// Generation-service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai", "ollama", "none".
    #[serde(default = "default_openai")]
    pub provider: String,
    /// Base URL for the API.
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model that drafts each turn.
    #[serde(default = "default_narrator_model")]
    pub narrator_model: String,
    /// Model used by the cross-check editor.
    #[serde(default = "default_editor_model")]
    pub editor_model: String,
    /// Sampling temperature for the narrator.
    #[serde(default = "default_narrator_temperature")]
    pub narrator_temperature: f32,
    /// Sampling temperature for the editor.
    #[serde(default = "default_editor_temperature")]
    pub editor_temperature: f32,
    /// Maximum output tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard timeout for any call in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries per call. A failed turn is shown to the player, so 0 by default.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            base_url: default_openai_url(),
            api_key_env: default_api_key_env(),
            narrator_model: default_narrator_model(),
            editor_model: default_editor_model(),
            narrator_temperature: default_narrator_temperature(),
            editor_temperature: default_editor_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: 0,
        }
    }
}

/// Second-opinion editor pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrossCheckConfig {
    /// Whether drafts are routed through the editor.
    #[serde(default)]
    pub enabled: bool,
    /// Editor provider; inherits `llm.provider` when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Editor base URL; inherits `llm.base_url` when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Editor API key variable; inherits `llm.api_key_env` when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from(".") }
fn default_world_file() -> String { "db.json".to_string() }
fn default_transcript_file() -> String { "chat_history.json".to_string() }
fn default_prompts_file() -> String { "prompts.json".to_string() }
fn default_backup_file() -> String { "db_backup.json".to_string() }
fn default_window_turns() -> usize { 6 }
fn default_log_entry_cap() -> usize { 150 }
fn default_recent_story_buffer() -> usize { 3 }
fn default_friendship_min() -> i64 { -1000 }
fn default_friendship_max() -> i64 { 1000 }
fn default_max_log_entries() -> usize { 500 }
fn default_openai() -> String { "openai".to_string() }
fn default_openai_url() -> String { "https://api.openai.com".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_narrator_model() -> String { "gpt-4o".to_string() }
fn default_editor_model() -> String { "gpt-4o-mini".to_string() }
fn default_narrator_temperature() -> f32 { 0.5 }
fn default_editor_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 2048 }
fn default_timeout_ms() -> u64 { 60_000 }
