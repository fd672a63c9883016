//! Scan command - fetch, filter, extract and store mailbox items.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use epistle_types::{RecordType, TimeWindow};

use super::Context;
use crate::assemble;

/// Arguments for the scan command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Restrict the scan to one category (e.g. bills, orders, travel)
    #[arg(short, long)]
    pub category: Option<String>,

    /// Only consider items from the last N days
    #[arg(short, long)]
    pub days: Option<i64>,

    /// Re-ingest items that were already seen, replacing their records
    #[arg(short, long)]
    pub force: bool,
}

/// Run the scan command.
pub async fn run(args: ScanArgs, ctx: &Context) -> Result<()> {
    let category = match &args.category {
        Some(raw) => Some(RecordType::parse(raw).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown category '{}'. Try one of: bills, university, promotions, orders, \
                 shipping, banking, insurance, travel, tax, general",
                raw
            )
        })?),
        None => None,
    };
    let window = args.days.map(TimeWindow::last_days);

    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let agent = assemble::build_agent(&loaded.config)?;

    let dim = Style::new().dim();
    if ctx.verbose {
        if let Some(path) = &loaded.path {
            println!("{}", dim.apply_to(format!("Config: {}", path.display())));
        }
        if let Some(category) = category {
            println!("{}", dim.apply_to(format!("Category: {}", category)));
        }
        if let Some(days) = args.days {
            println!("{}", dim.apply_to(format!("Window: last {} day(s)", days)));
        }
    }

    let report = agent.run_scan(category, window.as_ref(), args.force).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let green = Style::new().green();
    println!();
    println!("{}", style("Scan Report").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  Fetched:     {}", style(report.fetched).cyan());
    println!("  Extracted:   {}", green.apply_to(report.extracted));
    println!("  Duplicates:  {}", report.skipped_duplicate);
    println!("  Irrelevant:  {}", report.irrelevant);
    if report.failed > 0 {
        let red = Style::new().red();
        println!("  Failed:      {}", red.apply_to(report.failed));
        for error in &report.errors {
            println!("    {}", dim.apply_to(error));
        }
    }
    println!();

    Ok(())
}
