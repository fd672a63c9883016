//! Ask command - one-shot question to the agent.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;
use crate::assemble;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or request to send
    #[arg(required = true)]
    pub question: String,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let agent = assemble::build_agent(&loaded.config)?;

    let response = agent.handle_user_turn(&args.question).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.text);

    if ctx.verbose {
        let dim = Style::new().dim();
        println!();
        println!(
            "{}",
            dim.apply_to(format!(
                "(action: {}, {} record(s) used)",
                response.action,
                response.records_used.len()
            ))
        );
    }

    Ok(())
}
