//! Configuration schema.
//!
//! Every section is optional in the TOML file; missing sections and fields
//! fall back to defaults so an empty file (or no file at all) yields a
//! working configuration backed by mock providers where credentials would
//! otherwise be required.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration for the Epistle agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EpistleConfig {
    #[serde(default)]
    pub llm: LlmSection,

    #[serde(default)]
    pub embedding: EmbeddingSection,

    #[serde(default)]
    pub mail: MailSection,

    #[serde(default)]
    pub ingest: IngestSection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    #[serde(default)]
    pub reminders: ReminderSection,

    #[serde(default)]
    pub storage: StorageSection,
}

impl EpistleConfig {
    /// Parse a TOML document into a config.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Render the config back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [llm]
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completion backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LlmSection {
    /// Backend provider: `openai`, `groq`, `ollama`, or `mock`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier. Defaults per provider when unset.
    #[serde(default)]
    pub model: Option<String>,

    /// Override the provider's base URL (self-hosted gateways).
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key inline in the config file. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retry budget for transient failures.
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl LlmSection {
    /// Resolve the API key: environment variable first, then the inline value.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(var) = &self.api_key_env
            && let Ok(key) = env::var(var)
            && !key.is_empty()
        {
            return Some(key);
        }
        self.api_key.clone()
    }
}

fn default_llm_provider() -> String {
    "mock".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_llm_retries() -> u32 {
    3
}

// ─────────────────────────────────────────────────────────────────────────────
// [embedding]
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingSection {
    /// Embedding provider: `openai` or `mock`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output vector width. Must match the stored index.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,

    /// Override the provider's base URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            base_url: None,
            api_key_env: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "mock".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

// ─────────────────────────────────────────────────────────────────────────────
// [mail]
// ─────────────────────────────────────────────────────────────────────────────

/// Mailbox connector selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MailSection {
    /// Path to a JSON fixture mailbox. When unset the agent runs with an
    /// empty mock mailbox.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// [ingest]
// ─────────────────────────────────────────────────────────────────────────────

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IngestSection {
    /// Maximum number of items processed concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Per-item processing timeout in seconds.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Relevance classifier: `llm` (with keyword fallback) or `keyword`.
    #[serde(default = "default_relevance_mode")]
    pub relevance: String,

    /// Maximum characters retained in `body_preview`.
    #[serde(default = "default_preview_max")]
    pub preview_max: usize,

    /// Maximum characters retained in `summary`.
    #[serde(default = "default_summary_max")]
    pub summary_max: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            item_timeout_secs: default_item_timeout(),
            relevance: default_relevance_mode(),
            preview_max: default_preview_max(),
            summary_max: default_summary_max(),
        }
    }
}

fn default_max_in_flight() -> usize {
    4
}

fn default_item_timeout() -> u64 {
    60
}

fn default_relevance_mode() -> String {
    "llm".to_string()
}

fn default_preview_max() -> usize {
    500
}

fn default_summary_max() -> usize {
    300
}

// ─────────────────────────────────────────────────────────────────────────────
// [retrieval]
// ─────────────────────────────────────────────────────────────────────────────

/// Search tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RetrievalSection {
    /// Number of results returned to the caller.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum best-hit similarity before the keyword fallback kicks in.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_confidence_threshold() -> f32 {
    0.35
}

// ─────────────────────────────────────────────────────────────────────────────
// [reminders]
// ─────────────────────────────────────────────────────────────────────────────

/// Due-date reminder scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReminderSection {
    /// Days before the due date at which a reminder fires.
    #[serde(default = "default_days_before")]
    pub days_before: Vec<i64>,

    /// Scheduler poll interval in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Delivery channel: `console`, `email`, `telegram`, or `whatsapp`.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Channel-specific recipient address.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Webhook endpoint for non-console channels.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for ReminderSection {
    fn default() -> Self {
        Self {
            days_before: default_days_before(),
            check_interval_secs: default_check_interval(),
            channel: default_channel(),
            recipient: None,
            webhook_url: None,
        }
    }
}

fn default_days_before() -> Vec<i64> {
    vec![3, 1]
}

fn default_check_interval() -> u64 {
    300
}

fn default_channel() -> String {
    "console".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// [storage]
// ─────────────────────────────────────────────────────────────────────────────

/// Record store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// SQLite database path. Defaults to `~/.epistle/records.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageSection {
    /// Resolve the database path: `EPISTLE_DB_PATH`, then the configured
    /// value, then the home-directory default.
    pub fn effective_db_path(&self) -> PathBuf {
        if let Ok(path) = env::var("EPISTLE_DB_PATH")
            && !path.is_empty()
        {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".epistle")
            .join("records.db")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = EpistleConfig::from_toml("").unwrap();
        assert_eq!(config, EpistleConfig::default());
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.ingest.max_in_flight, 4);
        assert_eq!(config.reminders.days_before, vec![3, 1]);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml = r#"
            [llm]
            provider = "groq"
            model = "llama-3.3-70b-versatile"

            [retrieval]
            top_k = 10
        "#;
        let config = EpistleConfig::from_toml(toml).unwrap();
        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.model.as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.retrieval.top_k, 10);
        assert!((config.retrieval.confidence_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let toml = r#"
            [llm]
            provder = "openai"
        "#;
        assert!(EpistleConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = EpistleConfig::default();
        config.llm.provider = "openai".to_string();
        config.mail.fixture_path = Some(PathBuf::from("/tmp/mailbox.json"));
        config.reminders.days_before = vec![7, 3, 1];

        let text = config.to_toml().unwrap();
        let parsed = EpistleConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_resolve_api_key_prefers_inline_when_env_unset() {
        let section = LlmSection {
            api_key: Some("sk-inline".to_string()),
            api_key_env: Some("EPISTLE_TEST_KEY_THAT_DOES_NOT_EXIST".to_string()),
            ..LlmSection::default()
        };
        assert_eq!(section.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn test_resolve_api_key_none_when_nothing_set() {
        let section = LlmSection::default();
        assert!(section.resolve_api_key().is_none());
    }

    #[test]
    fn test_effective_db_path_prefers_configured_value() {
        let section = StorageSection {
            db_path: Some(PathBuf::from("/tmp/epistle-test.db")),
        };
        if env::var("EPISTLE_DB_PATH").is_err() {
            assert_eq!(
                section.effective_db_path(),
                PathBuf::from("/tmp/epistle-test.db")
            );
        }
    }
}
