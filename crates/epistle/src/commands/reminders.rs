//! Reminders command - payment reminder operations.

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::Context;
use crate::assemble;

/// Arguments for the reminders command.
#[derive(Args, Debug)]
pub struct RemindersArgs {
    #[command(subcommand)]
    pub command: Option<ReminderCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ReminderCommand {
    /// List pending reminders (default)
    List,

    /// Deliver everything currently due, once
    Check,
}

/// Run the reminders command.
pub async fn run(args: RemindersArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ReminderCommand::List) {
        ReminderCommand::List => cmd_list(ctx).await,
        ReminderCommand::Check => cmd_check(ctx).await,
    }
}

async fn cmd_list(ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let store = assemble::open_store(&loaded.config)?;
    let pending = store.pending_reminders()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if pending.is_empty() {
        println!("{}", dim.apply_to("No pending reminders."));
        return Ok(());
    }

    let today = Utc::now().date_naive();
    println!();
    println!("{}", style("Pending Reminders").bold());
    println!("{}", dim.apply_to("─".repeat(60)));
    println!();
    for reminder in &pending {
        let amount = match reminder.amount {
            Some(amount) => format!("${:.2}", amount),
            None => "-".to_string(),
        };
        let days_left = (reminder.due_date - today).num_days();
        let due = if days_left < 0 {
            Style::new()
                .red()
                .apply_to(format!("due {} (overdue)", reminder.due_date))
                .to_string()
        } else {
            format!("due {} ({} day(s) left)", reminder.due_date, days_left)
        };
        println!(
            "  {}  {:<20} {:>10}  {}",
            reminder.remind_at.format("%Y-%m-%d %H:%M"),
            reminder.vendor,
            amount,
            due
        );
    }
    let counts = store.reminder_status_counts()?;
    println!();
    println!(
        "{}",
        dim.apply_to(format!(
            "{} pending, {} sent, {} failed",
            counts.pending, counts.sent, counts.failed
        ))
    );

    Ok(())
}

async fn cmd_check(ctx: &Context) -> Result<()> {
    let loaded = epistle_config::load_config(ctx.config_path.as_deref())?;
    let agent = assemble::build_agent(&loaded.config)?;

    let report = agent.check_reminders().await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.failed > 0 {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("⚠"), report);
    } else {
        println!("{}", report);
    }

    Ok(())
}
