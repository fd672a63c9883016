//! Interactive chat loop.
//!
//! Plain messages go through the intent router, so "scan my inbox" or
//! "how much did I spend on bills?" work as typed. Slash commands cover
//! the session-level operations that should not round-trip the router.

use anyhow::Result;
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use epistle_agent::Agent;

/// Line editor, terminal handle and the agent behind the session.
pub struct Repl {
    agent: Agent,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    pub fn new(agent: Agent, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            agent,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    /// Read lines until Ctrl+D or /quit.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        // Due reminders fire to the console while the session is open.
        let _reminder_loop = self.agent.spawn_reminder_loop();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    // Slash commands bypass the router
                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    // Route as a user turn
                    if let Err(e) = self.send_message(line).await {
                        self.print_error(&format!("Error: {}", e));
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - cancel current input but don't exit
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D - exit
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    /// Send one turn through the agent and print the phrased response.
    async fn send_message(&mut self, message: &str) -> Result<()> {
        let response = self.agent.handle_user_turn(message).await?;

        println!("{}", response.text);
        if self.verbose && !response.records_used.is_empty() {
            let dim = Style::new().dim();
            println!(
                "{}",
                dim.apply_to(format!(
                    "(action: {}, {} record(s) used)",
                    response.action,
                    response.records_used.len()
                ))
            );
        }
        println!();

        Ok(())
    }

    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let cmd = input[1..].split_whitespace().next().unwrap_or("");

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "status" => {
                self.print_status()?;
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Epistle Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Ask about your mail, tell me to scan, or request a spending summary.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Show store status", style("/status").cyan());
        println!();
        println!("{}", dim.apply_to("Everything else is routed by intent, e.g.:"));
        println!("  {}", dim.apply_to("scan my inbox for bills"));
        println!("  {}", dim.apply_to("what did I spend on subscriptions last month?"));
        println!("  {}", dim.apply_to("find a cheaper alternative to my internet plan"));
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Cancel current input", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }

    fn print_status(&self) -> Result<()> {
        let dim = Style::new().dim();
        let store = self.agent.store();
        let stats = store.stats()?;

        println!(
            "Records: {}  Pending reminders: {}  Embeddings: {}",
            style(stats.record_count).cyan(),
            style(stats.pending_reminder_count).cyan(),
            style(stats.embedding_count).cyan()
        );
        if stats.vectors_stale {
            println!(
                "{}",
                Style::new()
                    .red()
                    .apply_to("Embedding index is stale. Run `epistle reindex`.")
            );
        }
        if let Some(scan) = store.last_scan()? {
            println!(
                "{}",
                dim.apply_to(format!(
                    "Last scan: {} ({} ingested, {} duplicates)",
                    scan.at.format("%Y-%m-%d %H:%M UTC"),
                    scan.ingested,
                    scan.duplicates
                ))
            );
        } else {
            println!("{}", dim.apply_to("No scans recorded yet."));
        }
        Ok(())
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("epistle>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

enum ControlFlow {
    Continue,
    Exit,
}
