//! Configuration for the chatmem memory engine.
//!
//! Maps directly to `chatmem.toml`. Every field has a default, so an empty
//! file (or no file at all) reproduces the engine's built-in constants.

use serde::{Deserialize, Serialize};

/// Top-level chatmem configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatmemConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Ranking, summary and cleanup tuning.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Extraction call budget.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// LLM backend used by the extraction adapter.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Snapshot storage settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ChatmemConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ChatmemError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ChatmemError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level or filter directive: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Per-subject memory behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Importance used when a caller does not supply one.
    #[serde(default = "default_importance")]
    pub default_importance: f64,
    /// Results returned by context-driven retrieval.
    #[serde(default = "default_5_usize")]
    pub relevant_limit: usize,
    /// Results taken per keyword probe during context-driven retrieval.
    #[serde(default = "default_3_usize")]
    pub per_keyword_limit: usize,
    /// Shortest keyword (in characters) used as a probe.
    #[serde(default = "default_2_usize")]
    pub min_keyword_chars: usize,
    /// Decayed importance a memory needs to appear in the summary.
    #[serde(default = "default_summary_min_importance")]
    pub summary_min_importance: f64,
    /// Top-N memories considered for the summary.
    #[serde(default = "default_20_usize")]
    pub summary_top_n: usize,
    /// Max event lines in the summary.
    #[serde(default = "default_5_usize")]
    pub summary_event_cap: usize,
    /// Max emotion lines in the summary.
    #[serde(default = "default_3_usize")]
    pub summary_emotion_cap: usize,
    /// Max relationship lines in the summary.
    #[serde(default = "default_3_usize")]
    pub summary_relationship_cap: usize,
    /// Memories whose raw decayed importance drops below this are deleted.
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: f64,
    /// Seconds between background cleanup sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Tag appended to every memory extracted from an onboarding description.
    #[serde(default = "default_onboarding_tag")]
    pub onboarding_tag: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_importance: 5.0,
            relevant_limit: 5,
            per_keyword_limit: 3,
            min_keyword_chars: 2,
            summary_min_importance: 3.0,
            summary_top_n: 20,
            summary_event_cap: 5,
            summary_emotion_cap: 3,
            summary_relationship_cap: 3,
            cleanup_threshold: 1.0,
            cleanup_interval_secs: 86_400,
            onboarding_tag: "onboarding".to_string(),
        }
    }
}

/// Budget for one extraction call, enforced by the engine around the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Hard timeout per attempt in milliseconds.
    #[serde(default = "default_15000")]
    pub timeout_ms: u64,
    /// Retries after a failed or timed-out attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_retries: 2,
        }
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: String,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_10000")]
    pub request_timeout_ms: u64,
    /// Retries inside the HTTP client.
    #[serde(default)]
    pub max_retries: u32,
    /// Ask the provider for JSON-constrained output (Ollama `format`,
    /// OpenAI `response_format`).
    #[serde(default)]
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            api_key: String::new(),
            max_tokens: 800,
            temperature: 0.3,
            request_timeout_ms: 10_000,
            max_retries: 0,
            json_mode: false,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect snapshot corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "chatmem.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_onboarding_tag() -> String { "onboarding".to_string() }
fn default_db_path() -> String { "chatmem.db".to_string() }
fn default_importance() -> f64 { 5.0 }
fn default_summary_min_importance() -> f64 { 3.0 }
fn default_cleanup_threshold() -> f64 { 1.0 }
fn default_temperature() -> f32 { 0.3 }
fn default_2() -> u32 { 2 }
fn default_max_tokens() -> u32 { 800 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_20_usize() -> usize { 20 }
fn default_cleanup_interval() -> u64 { 86_400 }
fn default_10000() -> u64 { 10_000 }
fn default_15000() -> u64 { 15_000 }
