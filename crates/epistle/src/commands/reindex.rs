//! Reindex command - rebuild the embedding index.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;
use crate::assemble;

/// Arguments for the reindex command.
#[derive(Args, Debug)]
pub struct ReindexArgs {
    /// Estimate the work without calling the embedding provider
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the reindex command.
pub async fn run(args: ReindexArgs, ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let dim = Style::new().dim();

    if args.dry_run {
        let store = assemble::open_store(&loaded.config)?;
        let dry = store.reindex_dry_run()?;
        println!(
            "Would embed {} record(s), roughly {} token(s).",
            style(dry.record_count).cyan(),
            style(dry.estimated_tokens).cyan()
        );
        return Ok(());
    }

    // The agent wires the configured embedder; reindex refuses to run
    // without one.
    let agent = assemble::build_agent(&loaded.config)?;
    let dry = agent.store().reindex_dry_run()?;

    if dry.record_count == 0 {
        println!("{}", dim.apply_to("Nothing to embed."));
        return Ok(());
    }

    println!("{}", style("Reindex").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  Provider:     {}",
        style(&loaded.config.embedding.provider).cyan()
    );
    println!(
        "  Dimensions:   {}",
        style(loaded.config.embedding.dimensions).cyan()
    );
    println!("  Records:      {}", style(dry.record_count).cyan());
    println!("  Est. tokens:  ~{}", dry.estimated_tokens);
    println!();

    if !args.yes && !confirm("Rebuild the index?")? {
        println!("{}", dim.apply_to("Cancelled."));
        return Ok(());
    }

    let report = agent.reindex().await?;

    println!();
    println!("{}", style("Reindex complete").bold().green());
    println!(
        "  Embedded:  {} of {}",
        style(report.embedded).green(),
        report.total
    );
    if report.skipped > 0 {
        let yellow = Style::new().yellow();
        println!("  Skipped:   {}", yellow.apply_to(report.skipped));
    }
    println!("  Took:      {:.1?}", report.elapsed);

    Ok(())
}

/// Prompt on stderr and read a y/N answer from stdin.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
