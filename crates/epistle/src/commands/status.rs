//! Status command - store and configuration overview.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use epistle_store::{ScanSummary, StoreStats};

use super::Context;
use crate::assemble;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    config_path: Option<PathBuf>,
    db_path: PathBuf,
    stats: StoreStats,
    /// Pending reminders firing within the next 24 hours.
    upcoming_24h: usize,
    last_scan: Option<ScanSummary>,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let db_path = loaded.config.storage.effective_db_path();

    let store = assemble::open_store(&loaded.config)?;
    let stats = store.stats()?;
    let upcoming_24h = store.upcoming_reminders(Utc::now(), 24)?.len();
    let last_scan = store.last_scan()?;

    if ctx.json_output {
        let output = StatusOutput {
            config_path: loaded.path,
            db_path,
            stats,
            upcoming_24h,
            last_scan,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Epistle Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    match &loaded.path {
        Some(path) => println!("  Config:      {}", path.display()),
        None => println!("  Config:      {}", dim.apply_to("(defaults)")),
    }
    println!("  Database:    {}", db_path.display());
    println!("  Schema:      v{}", stats.schema_version);
    println!();
    println!("  Records:     {}", style(stats.record_count).cyan());
    for (record_type, count) in &stats.records_by_type {
        println!("    {:<12} {}", record_type, count);
    }
    println!("  Seen:        {}", stats.seen_count);
    println!(
        "  Reminders:   {} ({} pending)",
        stats.reminder_count, stats.pending_reminder_count
    );
    if upcoming_24h > 0 {
        println!(
            "    {}",
            dim.apply_to(format!("{} firing in the next 24h", upcoming_24h))
        );
    }
    println!("  Embeddings:  {}", stats.embedding_count);
    println!();

    println!("{}", style("Embedding Index").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    match &stats.embedding_provider {
        Some(provider) => println!("  Provider:    {}", style(provider).cyan()),
        None => println!("  Provider:    {}", dim.apply_to("(not initialized)")),
    }
    match stats.embedding_dimensions {
        Some(dims) => println!("  Dimensions:  {}", style(dims).cyan()),
        None => println!("  Dimensions:  {}", dim.apply_to("(not initialized)")),
    }
    if stats.vectors_stale {
        println!(
            "  Status:      {}",
            Style::new().red().apply_to("STALE (run `epistle reindex`)")
        );
    } else {
        println!("  Status:      {}", Style::new().green().apply_to("ok"));
    }

    if let Some(scan) = &last_scan {
        println!();
        println!("{}", style("Last Scan").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!();
        println!("  At:          {}", scan.at.format("%Y-%m-%d %H:%M UTC"));
        println!("  Scanned:     {}", scan.scanned);
        println!("  Ingested:    {}", scan.ingested);
        println!("  Duplicates:  {}", scan.duplicates);
        println!("  Irrelevant:  {}", scan.irrelevant);
        if scan.failed > 0 {
            println!(
                "  Failed:      {}",
                Style::new().red().apply_to(scan.failed)
            );
        }
    }
    println!();

    Ok(())
}
