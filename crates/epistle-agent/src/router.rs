//! Intent routing for user turns.
//!
//! Lexical rules resolve the deterministic cases first; only when they are
//! insufficient is the LLM classifier consulted. Routing is a pure decision
//! with no side effects, and it never errors: a missing or failing backend
//! degrades to the lexical rules.
//!
//! The one hard constraint is that nothing here defaults to
//! [`IntentAction::Ingest`]. Ingestion calls paid APIs and mutates the
//! store, so it only fires on an explicit scan cue.

use regex::Regex;
use tracing::debug;

use epistle_llm::{ChatMessage, CompletionRequest, LlmBackend, SharedBackend};
use epistle_types::{Intent, IntentAction, RecordType, TimeWindow};

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Classifies user turns into [`Intent`]s.
pub struct Router {
    backend: Option<SharedBackend>,
    model: String,
    relative_window: Regex,
}

const CLASSIFY_MAX_TOKENS: u32 = 16;

impl Router {
    /// Lexical-rules-only router.
    pub fn new() -> Self {
        Self {
            backend: None,
            model: String::new(),
            // "last 30 days", "past 2 weeks", "previous 3 months"
            relative_window: Regex::new(
                r"(?:last|past|previous)\s+(\d{1,3})\s+(day|week|month|year)s?",
            )
            .unwrap(),
        }
    }

    /// Attach an LLM backend consulted when lexical rules are insufficient.
    pub fn with_backend(mut self, backend: SharedBackend, model: impl Into<String>) -> Self {
        self.backend = Some(backend);
        self.model = model.into();
        self
    }

    /// Classify one user turn. Never errors; never defaults to `Ingest`.
    pub async fn classify(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();

        let category = parse_category(&lower);
        let window = self.parse_window(&lower);

        let action = match lexical_action(&lower) {
            Some(action) => action,
            None => self.llm_action(text).await.unwrap_or_else(|| {
                if looks_interrogative(&lower) {
                    IntentAction::Query
                } else {
                    IntentAction::Unknown
                }
            }),
        };

        debug!(action = %action, ?category, "Routed user turn");

        let mut intent = Intent::new(action, text);
        if let Some(category) = category {
            intent = intent.with_category(category);
        }
        if let Some(window) = window {
            intent = intent.with_window(window);
        }
        intent
    }

    /// Ask the backend for an intent hint. `None` when no backend is
    /// configured, the call fails, or the hint is unusable.
    async fn llm_action(&self, text: &str) -> Option<IntentAction> {
        let backend = self.backend.as_ref()?;

        let request = CompletionRequest::new(
            &self.model,
            vec![ChatMessage::user(text)],
            CLASSIFY_MAX_TOKENS,
        )
        .with_system(INTENT_PROMPT)
        .with_temperature(0.0);

        match backend.complete(request).await {
            Ok(response) => {
                let hint = IntentAction::parse_hint(&response.content);
                debug!(raw = %response.content.trim(), hint = %hint, "LLM intent hint");
                // An Ingest hint without a lexical scan cue is not trusted.
                match hint {
                    IntentAction::Ingest | IntentAction::Unknown => None,
                    other => Some(other),
                }
            }
            Err(e) => {
                debug!(error = %e, "Intent classification call failed, using lexical rules");
                None
            }
        }
    }

    /// Parse a time window phrase, if any.
    fn parse_window(&self, lower: &str) -> Option<TimeWindow> {
        if let Some(caps) = self.relative_window.captures(lower) {
            let n: i64 = caps[1].parse().ok()?;
            let unit_days = match &caps[2] {
                "day" => 1,
                "week" => 7,
                "month" => 30,
                "year" => 365,
                _ => return None,
            };
            return Some(TimeWindow::last_days(n * unit_days));
        }

        for (phrase, days) in FIXED_WINDOWS {
            if lower.contains(phrase) {
                return Some(TimeWindow::last_days(*days));
            }
        }
        None
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

const INTENT_PROMPT: &str = "You classify requests to a personal mail assistant. \
Respond with exactly one word from: query, analyze, find_alternatives, remind, unknown. \
query = search stored emails/records. analyze = summarize or total spending. \
find_alternatives = look for cheaper services. remind = payment reminders. \
unknown = anything else. One word, nothing more.";

// ─────────────────────────────────────────────────────────────────────────────
// Lexical rules
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed window phrases, checked after the "last N units" form.
const FIXED_WINDOWS: &[(&str, i64)] = &[
    ("last week", 7),
    ("past week", 7),
    ("this week", 7),
    ("last month", 30),
    ("past month", 30),
    ("this month", 30),
    ("last year", 365),
    ("this year", 365),
    ("yesterday", 2),
    ("today", 1),
];

/// Nouns that make an otherwise ambiguous verb a scan request.
const MAIL_NOUNS: &[&str] = &["inbox", "mail", "mailbox", "email", "emails"];

/// Resolve the action from lexical cues alone.
fn lexical_action(lower: &str) -> Option<IntentAction> {
    if has_word(lower, "remind") || has_word(lower, "reminder") || has_word(lower, "reminders") {
        return Some(IntentAction::Remind);
    }

    if has_word(lower, "cheaper")
        || has_word(lower, "alternative")
        || has_word(lower, "alternatives")
    {
        return Some(IntentAction::FindAlternatives);
    }

    let spend_verbs = ["spend", "spent", "spending", "pay", "paid", "cost", "owe"];
    if spend_verbs.iter().any(|w| has_word(lower, w))
        && (lower.contains("how much") || lower.contains("total") || has_word(lower, "spending"))
    {
        return Some(IntentAction::Analyze);
    }

    // Scan cues. "scan" and "ingest" stand alone; "check"/"fetch"/"sync"/
    // "pull" need a mail noun ("check my inbox", "fetch new emails").
    if has_word(lower, "scan") || has_word(lower, "ingest") || has_word(lower, "rescan") {
        return Some(IntentAction::Ingest);
    }
    let scan_verbs = ["check", "fetch", "sync", "pull"];
    if scan_verbs.iter().any(|v| has_word(lower, v))
        && MAIL_NOUNS.iter().any(|n| has_word(lower, n))
    {
        return Some(IntentAction::Ingest);
    }

    let query_openers = ["show", "list", "find", "search", "display"];
    if query_openers
        .iter()
        .any(|w| lower.split_whitespace().next() == Some(*w))
        || lower.contains("do i have")
        || has_word(lower, "what")
        || has_word(lower, "when")
        || has_word(lower, "which")
        || has_word(lower, "where")
    {
        return Some(IntentAction::Query);
    }

    None
}

/// Whole-word containment over alphanumeric token boundaries.
fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// First token that names a record category wins.
fn parse_category(lower: &str) -> Option<RecordType> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .find_map(RecordType::parse)
}

/// Question-shaped input routes to `Query` when nothing else matched.
fn looks_interrogative(lower: &str) -> bool {
    if lower.trim_end().ends_with('?') {
        return true;
    }
    let openers = [
        "what", "when", "where", "which", "who", "how", "do", "does", "did", "is", "are", "can",
        "could", "have", "has",
    ];
    match lower.split_whitespace().next() {
        Some(first) => openers.contains(&first),
        None => false,
    }
}
