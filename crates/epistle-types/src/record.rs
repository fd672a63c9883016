//! Source items and structured records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Record Categories
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a structured record.
///
/// Unknown category strings coerce to [`RecordType::General`] rather than
/// failing; the extraction model is not trusted to stay inside the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Bill,
    University,
    Promotion,
    Order,
    Shipping,
    Banking,
    Insurance,
    Travel,
    Tax,
    General,
}

impl RecordType {
    /// All categories, in display order.
    pub const ALL: [RecordType; 10] = [
        RecordType::Bill,
        RecordType::University,
        RecordType::Promotion,
        RecordType::Order,
        RecordType::Shipping,
        RecordType::Banking,
        RecordType::Insurance,
        RecordType::Travel,
        RecordType::Tax,
        RecordType::General,
    ];

    /// The stable string form used in storage and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Bill => "bill",
            RecordType::University => "university",
            RecordType::Promotion => "promotion",
            RecordType::Order => "order",
            RecordType::Shipping => "shipping",
            RecordType::Banking => "banking",
            RecordType::Insurance => "insurance",
            RecordType::Travel => "travel",
            RecordType::Tax => "tax",
            RecordType::General => "general",
        }
    }

    /// Parse a category string, returning `None` for unknown values.
    pub fn parse(s: &str) -> Option<RecordType> {
        match s.trim().to_lowercase().as_str() {
            "bill" | "bills" | "invoice" => Some(RecordType::Bill),
            "university" | "universities" | "admission" | "admissions" => {
                Some(RecordType::University)
            }
            "promotion" | "promotions" | "promo" | "offer" | "offers" => {
                Some(RecordType::Promotion)
            }
            "order" | "orders" | "receipt" | "receipts" => Some(RecordType::Order),
            "shipping" | "delivery" | "shipment" => Some(RecordType::Shipping),
            "banking" | "bank" | "statement" => Some(RecordType::Banking),
            "insurance" => Some(RecordType::Insurance),
            "travel" | "flight" | "flights" | "booking" => Some(RecordType::Travel),
            "tax" | "taxes" => Some(RecordType::Tax),
            "general" => Some(RecordType::General),
            _ => None,
        }
    }

    /// Parse a category string, coercing unknown values to `General`.
    pub fn coerce(s: &str) -> RecordType {
        Self::parse(s).unwrap_or(RecordType::General)
    }

    /// Whether this category carries the financial sub-schema
    /// (`amount`, `vendor`, `due_date`).
    pub fn is_financial(&self) -> bool {
        matches!(
            self,
            RecordType::Bill
                | RecordType::Order
                | RecordType::Banking
                | RecordType::Insurance
                | RecordType::Tax
        )
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Items
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to an attachment on a source item.
///
/// Bytes are fetched lazily through the mail connector; the listing only
/// carries enough to decide whether fetching is worthwhile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Provider-assigned attachment identifier.
    pub id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
}

/// One raw fetched unit: an email plus its attachment references.
///
/// Immutable once fetched; owned transiently by a single ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    /// Provider-assigned stable identity. Dedup keys on this.
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attachments: Vec<AttachmentRef>,
}

impl SourceItem {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        timestamp: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            timestamp,
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// The text a relevance or intent classifier sees for this item.
    pub fn classification_text(&self) -> String {
        format!(
            "From: {}\nSubject: {}\n\n{}",
            self.sender, self.subject, self.body
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured Records
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical normalized output of the ingestion pipeline.
///
/// `source_id` is unique across the store: re-ingesting the same source
/// never creates a second record. The financial fields (`amount`, `vendor`,
/// `due_date`) are populated only for financial categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Store key (UUID).
    pub id: String,
    pub record_type: RecordType,
    /// Backreference to the originating [`SourceItem`].
    pub source_id: String,
    pub sender: String,
    pub subject: String,
    /// Normalized calendar date of the underlying message or document.
    pub date: NaiveDate,
    /// Bounded-length excerpt of the message body.
    pub body_preview: String,
    /// Short description, usually model-generated.
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub due_date: Option<NaiveDate>,
    pub has_attachments: bool,
    /// True when attachment text or field extraction degraded and the
    /// record carries less than a fully extracted one would.
    #[serde(default)]
    pub extraction_failed: bool,
}

impl StructuredRecord {
    /// The text that gets embedded for semantic retrieval.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}\n{}", self.subject, self.summary, self.body_preview)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dedup Entries
// ─────────────────────────────────────────────────────────────────────────────

/// Mapping from a source identity to its ingestion outcome.
///
/// Consulted before any extraction call; owned by the deduplication store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupEntry {
    pub source_id: String,
    pub ingested_at: DateTime<Utc>,
    /// Key of the resulting [`StructuredRecord`].
    pub record_id: String,
}
