//! Config command - show, locate and scaffold the config file.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use epistle_config::EpistleConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a config file with defaults
    Init {
        /// Create a project-local epistle.toml instead of the user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Path => cmd_path(ctx).await,
        ConfigCommand::Init { local } => cmd_init(local).await,
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;

    // Keys never reach stdout, even when set inline.
    let mut shown = loaded.config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("(redacted)".to_string());
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    match &loaded.path {
        Some(path) => println!("# Loaded from {}\n", path.display()),
        None => println!("# No config file found (using defaults)\n"),
    }
    println!("{}", shown.to_toml()?);

    Ok(())
}

async fn cmd_path(ctx: &Context) -> Result<()> {
    match epistle_config::find_config(ctx.config_path.as_deref())? {
        Some(path) => println!("{}", path.display()),
        None => {
            println!("{}", epistle_config::user_config_path().display());
            eprintln!("(not created yet; run `epistle config init`)");
        }
    }
    Ok(())
}

async fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(epistle_config::PROJECT_CONFIG_FILE)
    } else {
        epistle_config::user_config_path()
    };

    if path.exists() {
        println!("{} already exists, leaving it alone.", path.display());
        return Ok(());
    }

    epistle_config::save_config(&EpistleConfig::default(), &path)?;
    println!("✓ Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  epistle config show     # inspect the defaults");
    println!("  epistle scan            # run your first scan");

    Ok(())
}
