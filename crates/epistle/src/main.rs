//! Epistle - Personal Mail Intelligence Agent
//!
//! Main entry point for the Epistle CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod assemble;
mod commands;

use commands::{ask, chat, config, reindex, reminders, scan, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Epistle - Personal Mail Intelligence Agent
#[derive(Parser)]
#[command(name = "epistle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = "EPISTLE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the mailbox and ingest structured records
    Scan(scan::ScanArgs),

    /// Ask a one-shot question about your stored records
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Show store and configuration status
    Status(status::StatusArgs),

    /// Payment reminder operations
    Reminders(reminders::RemindersArgs),

    /// Rebuild the embedding index with the configured provider
    Reindex(reindex::ReindexArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "epistle=debug,epistle_agent=debug,epistle_llm=debug,epistle_store=debug,epistle_mail=debug,epistle_config=debug,info"
    } else {
        "epistle=info,epistle_agent=info,epistle_llm=info,epistle_store=info,warn"
    };

    let log_dir = epistle_config::config_dir().join("logs");
    let file_appender = tracing_appender::rolling::daily(&log_dir, "epistle.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "epistle=trace,epistle_agent=trace,epistle_llm=trace,epistle_store=trace,epistle_mail=trace,epistle_config=trace,info",
                )),
        )
        .init();

    // Create context for commands
    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Scan(args) => scan::run(args, &ctx).await,
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Reminders(args) => reminders::run(args, &ctx).await,
        Commands::Reindex(args) => reindex::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
