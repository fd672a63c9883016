//! Pipeline reports, search hits, and turn responses.

use serde::{Deserialize, Serialize};

use crate::intent::IntentAction;
use crate::record::StructuredRecord;

/// Outcome counts for one ingestion run.
///
/// Per-item failures land in `failed` and `errors`; the batch itself never
/// aborts for them. `fetched` counts every candidate the connector returned,
/// so `skipped_duplicate + irrelevant + extracted + failed == fetched` after
/// a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionReport {
    pub fetched: usize,
    pub skipped_duplicate: usize,
    pub irrelevant: usize,
    pub extracted: usize,
    pub failed: usize,
    /// One entry per failed item: "item-id: reason".
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl IngestionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, source_id: &str, reason: impl std::fmt::Display) {
        self.failed += 1;
        self.errors.push(format!("{source_id}: {reason}"));
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched {}, extracted {}, skipped {} duplicate, {} irrelevant, {} failed",
            self.fetched, self.extracted, self.skipped_duplicate, self.irrelevant, self.failed
        )
    }
}

/// How a retrieval hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    /// Ranked by embedding similarity.
    Semantic,
    /// Substring match over sender/subject (fallback path).
    Keyword,
}

/// One retrieval result: a record with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: StructuredRecord,
    /// Higher is more relevant; semantic hits use `1 - distance`.
    pub score: f32,
    pub origin: MatchOrigin,
}

/// What the core hands back for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    /// The action the turn was routed to.
    pub action: IntentAction,
    /// Structured records the answer was assembled from, for provenance.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub records_used: Vec<StructuredRecord>,
}

impl TurnResponse {
    pub fn new(text: impl Into<String>, action: IntentAction) -> Self {
        Self {
            text: text.into(),
            action,
            records_used: Vec::new(),
        }
    }

    pub fn with_records(mut self, records: Vec<StructuredRecord>) -> Self {
        self.records_used = records;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_failure_accounting() {
        let mut report = IngestionReport::new();
        assert!(report.is_clean());

        report.fetched = 3;
        report.extracted = 2;
        report.record_failure("msg-9", "extraction timed out");

        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("msg-9:"));
    }

    #[test]
    fn test_report_display() {
        let report = IngestionReport {
            fetched: 5,
            skipped_duplicate: 1,
            irrelevant: 1,
            extracted: 2,
            failed: 1,
            errors: vec![],
        };
        let s = report.to_string();
        assert!(s.contains("fetched 5"));
        assert!(s.contains("extracted 2"));
    }

    #[test]
    fn test_turn_response_builder() {
        let resp = TurnResponse::new("no matches", IntentAction::Query);
        assert!(resp.records_used.is_empty());
        assert_eq!(resp.action, IntentAction::Query);
    }
}
