//! Configuration for the Epistle agent.
//!
//! A single TOML file configures the LLM and embedding backends, the
//! mailbox connector, ingestion and retrieval tuning, reminder delivery,
//! and the record store location. See [`discovery`] for where the file is
//! looked up.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, LoadedConfig, PROJECT_CONFIG_FILE, USER_CONFIG_FILE, config_dir, find_config,
    load_config, load_config_file, save_config, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::{
    EmbeddingSection, EpistleConfig, IngestSection, LlmSection, MailSection, ReminderSection,
    RetrievalSection, StorageSection,
};
