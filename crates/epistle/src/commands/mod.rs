//! CLI command handlers.

use std::path::PathBuf;

pub mod ask;
pub mod chat;
pub mod config;
pub mod reindex;
pub mod reminders;
pub mod repl;
pub mod scan;
pub mod status;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file path from `--config` / `EPISTLE_CONFIG`.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}
