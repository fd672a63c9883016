//! Query parameter and result types for the record store.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use epistle_types::RecordType;

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// Filter for listing records.
///
/// All fields are optional; an empty filter lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one category.
    pub record_type: Option<RecordType>,
    /// Earliest record date, inclusive.
    pub since: Option<NaiveDate>,
    /// Latest record date, inclusive.
    pub until: Option<NaiveDate>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn with_since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Statistics about the record store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Total number of structured records.
    pub record_count: usize,
    /// Record counts per category, largest first.
    pub records_by_type: Vec<(String, usize)>,
    /// Number of source ids in the dedup ledger.
    pub seen_count: usize,
    /// Total number of reminders.
    pub reminder_count: usize,
    /// Reminders still waiting to fire.
    pub pending_reminder_count: usize,
    /// Number of stored embeddings.
    pub embedding_count: usize,
    /// Current schema version.
    pub schema_version: i32,
    /// Embedding provider recorded at init (if vectors were initialized).
    pub embedding_provider: Option<String>,
    /// Embedding dimensions recorded at init.
    pub embedding_dimensions: Option<usize>,
    /// Whether stored embeddings are stale (dimension mismatch).
    pub vectors_stale: bool,
}

/// Summary of the most recent ingestion run, persisted in the meta table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// When the run finished.
    pub at: DateTime<Utc>,
    /// Source items listed by the connector.
    pub scanned: usize,
    /// New records committed.
    pub ingested: usize,
    /// Items skipped because they were already in the ledger.
    pub duplicates: usize,
    /// Items classified as not worth keeping.
    pub irrelevant: usize,
    /// Items that failed and produced no record.
    pub failed: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Spending
// ─────────────────────────────────────────────────────────────────────────────

/// One row of a spending aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct SpendingRow {
    /// Category name or vendor, depending on the grouping.
    pub key: String,
    /// Sum of amounts in this group.
    pub total: f64,
    /// Number of records in this group.
    pub count: usize,
}

/// Spending aggregation over financial records in a date window.
#[derive(Debug, Clone, Serialize)]
pub struct SpendingReport {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    /// Sum of all amounts in the window.
    pub total: f64,
    /// Number of financial records with a known amount.
    pub record_count: usize,
    /// Totals grouped by category, largest first.
    pub by_category: Vec<SpendingRow>,
    /// Totals grouped by vendor, largest first.
    pub by_vendor: Vec<SpendingRow>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reindex
// ─────────────────────────────────────────────────────────────────────────────

/// Dry-run reindex estimate.
#[derive(Debug, Clone)]
pub struct ReindexDryRun {
    /// Number of records that would be re-embedded.
    pub record_count: usize,
    /// Rough token estimate for the embedding calls.
    pub estimated_tokens: usize,
}

/// Result of re-embedding all stored records.
#[derive(Debug, Clone)]
pub struct ReindexReport {
    /// Records considered.
    pub total: usize,
    /// Records successfully re-embedded.
    pub embedded: usize,
    /// Records skipped (empty text).
    pub skipped: usize,
    /// Wall-clock time the reindex took.
    pub elapsed: Duration,
}
