//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;
use crate::assemble;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {}

/// Run the chat command (REPL).
pub async fn run(_args: ChatArgs, ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let agent = assemble::build_agent(&loaded.config)?;

    let mut repl = Repl::new(agent, ctx.verbose)?;
    repl.run().await
}
