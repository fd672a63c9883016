//! User-turn intents and time windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::RecordType;

/// Action class a user turn maps to.
///
/// `Ingest` is the only action with external cost and side effects, so the
/// router never defaults to it; see the routing rules in `epistle-agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    /// Fetch and extract new mail.
    Ingest,
    /// Search previously indexed records.
    Query,
    /// Aggregate spending over stored records.
    Analyze,
    /// Look for cheaper alternatives to a stored service.
    FindAlternatives,
    /// Create or inspect payment reminders.
    Remind,
    /// Could not be classified; caller should ask for clarification.
    Unknown,
}

impl IntentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentAction::Ingest => "ingest",
            IntentAction::Query => "query",
            IntentAction::Analyze => "analyze",
            IntentAction::FindAlternatives => "find_alternatives",
            IntentAction::Remind => "remind",
            IntentAction::Unknown => "unknown",
        }
    }

    /// Parse a raw intent hint (e.g. from the LLM classifier) leniently.
    ///
    /// Unknown strings map to `Unknown`, never to `Ingest`.
    pub fn parse_hint(s: &str) -> IntentAction {
        match s.trim().to_lowercase().as_str() {
            "ingest" | "scan" | "scan_emails" | "fetch" => IntentAction::Ingest,
            "query" | "search" | "query_history" => IntentAction::Query,
            "analyze" | "analyze_spending" | "analysis" => IntentAction::Analyze,
            "find_alternatives" | "alternatives" => IntentAction::FindAlternatives,
            "remind" | "reminder" | "set_reminder" | "reminders" => IntentAction::Remind,
            _ => IntentAction::Unknown,
        }
    }
}

impl std::fmt::Display for IntentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open time range over message timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// The window covering the last `days` days, ending now.
    pub fn last_days(days: i64) -> Self {
        let until = Utc::now();
        Self {
            since: until - Duration::days(days),
            until,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.since && ts < self.until
    }

    pub fn days(&self) -> i64 {
        (self.until - self.since).num_days()
    }
}

/// Classification result for one user turn.
///
/// Transient: produced by the router, consumed once by dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: IntentAction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<RecordType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window: Option<TimeWindow>,
    /// The original user text, preserved for downstream search/prompts.
    pub raw_query: String,
}

impl Intent {
    pub fn new(action: IntentAction, raw_query: impl Into<String>) -> Self {
        Self {
            action,
            category: None,
            window: None,
            raw_query: raw_query.into(),
        }
    }

    pub fn with_category(mut self, category: RecordType) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// An unclassifiable turn, surfaced to the caller for clarification.
    pub fn unknown(raw_query: impl Into<String>) -> Self {
        Self::new(IntentAction::Unknown, raw_query)
    }
}
