//! CLI integration tests for the Epistle command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Argument parsing works as expected
//! - Invalid inputs are rejected with appropriate messages
//! - The scan/ask/status flow works end to end against a fixture mailbox
//!
//! The end-to-end tests run with the default mock providers, so no network
//! or credentials are needed.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the epistle binary.
fn epistle() -> Command {
    let mut cmd = Command::cargo_bin("epistle").unwrap();
    cmd.env_remove("EPISTLE_CONFIG");
    cmd.env_remove("EPISTLE_DB_PATH");
    cmd
}

const MAILBOX: &str = r#"{
    "messages": [
        {
            "id": "msg-001",
            "sender": "billing@powerco.example",
            "subject": "Your electricity bill",
            "timestamp": "2025-03-02T08:00:00Z",
            "body": "Amount due: $142.75. Payment due by 2025-03-15."
        },
        {
            "id": "msg-002",
            "sender": "alice@friends.example",
            "subject": "Lunch on Friday?",
            "timestamp": "2025-03-03T12:00:00Z",
            "body": "See you at noon by the park."
        }
    ]
}"#;

/// Write a fixture mailbox plus a config pointing at it and at a temp
/// database, returning the config path.
fn write_workspace(dir: &TempDir) -> PathBuf {
    let fixture = dir.path().join("mailbox.json");
    std::fs::write(&fixture, MAILBOX).unwrap();

    let config_path = dir.path().join("epistle.toml");
    let config = format!(
        "[mail]\nfixture_path = \"{}\"\n\n\
         [ingest]\nrelevance = \"keyword\"\n\n\
         [storage]\ndb_path = \"{}\"\n",
        fixture.display(),
        dir.path().join("records.db").display()
    );
    std::fs::write(&config_path, config).unwrap();
    config_path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    epistle()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Epistle"))
        .stdout(predicate::str::contains("Personal Mail Intelligence"));
}

#[test]
fn test_version_displays() {
    epistle()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("epistle"));
}

#[test]
fn test_help_lists_subcommands() {
    epistle()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("reminders"))
        .stdout(predicate::str::contains("reindex"))
        .stdout(predicate::str::contains("config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Global Flag Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag_accepted() {
    epistle().args(["--verbose", "--help"]).assert().success();
}

#[test]
fn test_json_flag_accepted() {
    epistle().args(["--json", "--help"]).assert().success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Help Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scan_help() {
    epistle()
        .args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--category"))
        .stdout(predicate::str::contains("--days"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_ask_help() {
    epistle()
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("question"));
}

#[test]
fn test_chat_help() {
    epistle()
        .args(["chat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chat").or(predicate::str::contains("REPL")));
}

#[test]
fn test_status_help() {
    epistle()
        .args(["status", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_reminders_help() {
    epistle()
        .args(["reminders", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_reindex_help() {
    epistle()
        .args(["reindex", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_config_help() {
    epistle()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("path"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Invalid Input Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_subcommand_fails() {
    epistle()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_invalid_flag_fails() {
    epistle()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_scan_rejects_unknown_category() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "scan",
            "--category",
            "nonsense",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}

#[test]
fn test_missing_explicit_config_fails() {
    epistle()
        .args(["--config", "/nonexistent/epistle.toml", "status"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-End Tests (fixture mailbox, mock providers)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scan_ingests_fixture_mailbox() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);
    let config = config_path.to_str().unwrap();

    epistle()
        .args(["--config", config, "--json", "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fetched\": 2"))
        .stdout(predicate::str::contains("\"extracted\": 1"))
        .stdout(predicate::str::contains("\"irrelevant\": 1"));

    // Second scan: the bill is a duplicate, the chatter is re-evaluated.
    epistle()
        .args(["--config", config, "--json", "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"extracted\": 0"))
        .stdout(predicate::str::contains("\"skipped_duplicate\": 1"))
        .stdout(predicate::str::contains("\"irrelevant\": 1"));
}

#[test]
fn test_scan_human_output() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args(["--config", config_path.to_str().unwrap(), "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scan Report"))
        .stdout(predicate::str::contains("Extracted"));
}

#[test]
fn test_status_reflects_scan() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);
    let config = config_path.to_str().unwrap();

    epistle()
        .args(["--config", config, "scan"])
        .assert()
        .success();

    epistle()
        .args(["--config", config, "--json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"record_count\": 1"))
        .stdout(predicate::str::contains("\"last_scan\""));

    epistle()
        .args(["--config", config, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Epistle Status"))
        .stdout(predicate::str::contains("Records"));
}

#[test]
fn test_ask_before_any_scan_suggests_scanning() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "ask",
            "what was my electricity bill?",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored records match"));
}

#[test]
fn test_ask_finds_scanned_record() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);
    let config = config_path.to_str().unwrap();

    epistle()
        .args(["--config", config, "scan"])
        .assert()
        .success();

    epistle()
        .args(["--config", config, "ask", "what was my electricity bill?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matching record"))
        .stdout(predicate::str::contains("powerco.example"));
}

#[test]
fn test_reminders_list_empty() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args(["--config", config_path.to_str().unwrap(), "reminders", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending reminders"));
}

#[test]
fn test_reminders_check_reports_counts() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "--json",
            "reminders",
            "check",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"checked\": 0"));
}

#[test]
fn test_reindex_dry_run() {
    let dir = TempDir::new().unwrap();
    let config_path = write_workspace(&dir);

    epistle()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "reindex",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would embed"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Subcommand Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_resolves_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("epistle.toml");
    std::fs::write(&path, "[retrieval]\ntop_k = 7\n").unwrap();

    epistle()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("top_k = 7"))
        .stdout(predicate::str::contains("[llm]"));
}

#[test]
fn test_config_show_redacts_inline_api_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("epistle.toml");
    std::fs::write(&path, "[llm]\napi_key = \"sk-secret-123\"\n").unwrap();

    epistle()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("redacted"))
        .stdout(predicate::str::contains("sk-secret-123").not());
}

#[test]
fn test_config_path_prints_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("epistle.toml");
    std::fs::write(&path, "").unwrap();

    epistle()
        .args(["--config", path.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("epistle.toml"));
}
