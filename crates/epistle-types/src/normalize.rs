//! Record normalization: the schema gate between model output and storage.
//!
//! Extraction payloads come from an LLM and are untrusted: amounts arrive as
//! numbers or strings with currency symbols, dates in whatever format the
//! model felt like, fields missing entirely. [`Normalizer::normalize`]
//! coerces and validates a raw payload into a [`StructuredRecord`], or
//! fails with a [`NormalizationError`] naming the offending field. The
//! pipeline treats that failure as the signal to fall back to a minimal
//! record rather than dropping the item.

use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use crate::record::{RecordType, SourceItem, StructuredRecord};

/// Default cap on `body_preview` length, in characters.
const DEFAULT_PREVIEW_MAX: usize = 500;

/// Default cap on `summary` length, in characters.
const DEFAULT_SUMMARY_MAX: usize = 300;

/// A required field was absent or failed type coercion.
#[derive(Debug, Clone, thiserror::Error)]
#[error("field '{field}': {reason}")]
pub struct NormalizationError {
    pub field: &'static str,
    pub reason: String,
}

impl NormalizationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validates raw extraction payloads into canonical records.
///
/// Text bounds cap storage and embedding cost; both default to the values
/// the store and index were sized for.
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub preview_max: usize,
    pub summary_max: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            preview_max: DEFAULT_PREVIEW_MAX,
            summary_max: DEFAULT_SUMMARY_MAX,
        }
    }
}

impl Normalizer {
    pub fn new(preview_max: usize, summary_max: usize) -> Self {
        Self {
            preview_max,
            summary_max,
        }
    }

    /// Validate a raw extraction payload for `item` against the schema of
    /// `category`.
    ///
    /// Financial categories require a non-negative `amount`; a `due_date` or
    /// `date` present in the payload must parse as a calendar date. Unknown
    /// payload fields are ignored. Common fields always come from the source
    /// item itself, never from the model.
    pub fn normalize(
        &self,
        item: &SourceItem,
        category: RecordType,
        raw: &Value,
    ) -> Result<StructuredRecord, NormalizationError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| NormalizationError::new("payload", "not a JSON object"))?;

        // Financial categories require a valid amount; elsewhere invalid
        // values are dropped rather than failing the whole record.
        let amount = match obj.get("amount") {
            Some(Value::Null) | None => None,
            Some(v) => match parse_amount(v) {
                Some(a) if a >= 0.0 => Some(a),
                Some(a) if category.is_financial() => {
                    return Err(NormalizationError::new(
                        "amount",
                        format!("negative value {a}"),
                    ));
                }
                None if category.is_financial() => {
                    return Err(NormalizationError::new(
                        "amount",
                        format!("unparseable value {v}"),
                    ));
                }
                _ => None,
            },
        };

        if category.is_financial() && amount.is_none() {
            return Err(NormalizationError::new("amount", "missing"));
        }

        let due_date = match obj.get("due_date").and_then(non_empty_str) {
            Some(s) => Some(
                parse_calendar_date(s).ok_or_else(|| {
                    NormalizationError::new("due_date", format!("unparseable date '{s}'"))
                })?,
            ),
            None => None,
        };

        let date = match obj.get("date").and_then(non_empty_str) {
            Some(s) => parse_calendar_date(s)
                .ok_or_else(|| NormalizationError::new("date", format!("unparseable date '{s}'")))?,
            None => item.timestamp.date_naive(),
        };

        let vendor = obj
            .get("vendor")
            .and_then(non_empty_str)
            .map(|s| s.trim().to_string());

        let summary = obj
            .get("summary")
            .and_then(non_empty_str)
            .map(|s| truncate_chars(s, self.summary_max))
            .unwrap_or_else(|| truncate_chars(&item.subject, self.summary_max));

        // Financial fields are dropped, not errored, for non-financial
        // categories with no use for them: a parseable amount on a travel
        // booking is kept, but nothing is required.
        Ok(StructuredRecord {
            id: Uuid::new_v4().to_string(),
            record_type: category,
            source_id: item.id.clone(),
            sender: item.sender.clone(),
            subject: item.subject.clone(),
            date,
            body_preview: truncate_chars(&item.body, self.preview_max),
            summary,
            amount,
            vendor,
            due_date,
            has_attachments: item.has_attachments(),
            extraction_failed: false,
        })
    }

    /// Build the degraded record used when extraction persistently fails:
    /// category plus common fields only, flagged so callers can tell.
    pub fn minimal(&self, item: &SourceItem, category: RecordType) -> StructuredRecord {
        StructuredRecord {
            id: Uuid::new_v4().to_string(),
            record_type: category,
            source_id: item.id.clone(),
            sender: item.sender.clone(),
            subject: item.subject.clone(),
            date: item.timestamp.date_naive(),
            body_preview: truncate_chars(&item.body, self.preview_max),
            summary: truncate_chars(&item.subject, self.summary_max),
            amount: None,
            vendor: None,
            due_date: None,
            has_attachments: item.has_attachments(),
            extraction_failed: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coercion helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Coerce a JSON value into a monetary amount.
///
/// Accepts numbers and strings with currency symbols and thousands
/// separators ("$1,200.50" → 1200.5). Returns `None` when nothing numeric
/// can be recovered.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Parse a calendar date from the formats extraction payloads actually use.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    // RFC 3339 / ISO datetime first, then plain date formats.
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    const FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%B %d, %Y", "%d %b %Y"];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Truncate on a char boundary, never mid-codepoint.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn bill_item() -> SourceItem {
        SourceItem::new(
            "msg-1",
            "billing@acme.com",
            "Your March invoice",
            Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap(),
            "Amount due: $120.50 by March 15.",
        )
    }

    #[test]
    fn test_normalize_bill() {
        let raw = json!({
            "amount": "$120.50",
            "vendor": "Acme Utilities",
            "due_date": "2025-03-15",
            "summary": "Acme utility bill for March"
        });
        let record = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &raw)
            .unwrap();

        assert_eq!(record.record_type, RecordType::Bill);
        assert_eq!(record.source_id, "msg-1");
        assert_eq!(record.amount, Some(120.50));
        assert_eq!(record.vendor.as_deref(), Some("Acme Utilities"));
        assert_eq!(record.due_date, NaiveDate::from_ymd_opt(2025, 3, 15));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert!(!record.extraction_failed);
    }

    #[test]
    fn test_normalize_financial_requires_amount() {
        let raw = json!({"vendor": "Acme", "summary": "a bill"});
        let err = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &raw)
            .unwrap_err();
        assert_eq!(err.field, "amount");
    }

    #[test]
    fn test_normalize_rejects_negative_amount() {
        let raw = json!({"amount": -5.0});
        let err = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &raw)
            .unwrap_err();
        assert_eq!(err.field, "amount");
        assert!(err.reason.contains("negative"));
    }

    #[test]
    fn test_normalize_rejects_garbage_due_date() {
        let raw = json!({"amount": 10.0, "due_date": "whenever"});
        let err = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &raw)
            .unwrap_err();
        assert_eq!(err.field, "due_date");
    }

    #[test]
    fn test_normalize_non_financial_tolerates_missing_amount() {
        let raw = json!({"summary": "Admission decision enclosed"});
        let record = Normalizer::default()
            .normalize(&bill_item(), RecordType::University, &raw)
            .unwrap();
        assert_eq!(record.record_type, RecordType::University);
        assert!(record.amount.is_none());
    }

    #[test]
    fn test_normalize_non_financial_drops_unparseable_amount() {
        let raw = json!({"amount": "free", "summary": "50% off everything"});
        let record = Normalizer::default()
            .normalize(&bill_item(), RecordType::Promotion, &raw)
            .unwrap();
        assert!(record.amount.is_none());
    }

    #[test]
    fn test_normalize_non_financial_keeps_parseable_amount() {
        let raw = json!({"amount": "89.00", "summary": "Flight booking"});
        let record = Normalizer::default()
            .normalize(&bill_item(), RecordType::Travel, &raw)
            .unwrap();
        assert_eq!(record.amount, Some(89.0));
    }

    #[test]
    fn test_normalize_not_an_object() {
        let err = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &json!("just a string"))
            .unwrap_err();
        assert_eq!(err.field, "payload");
    }

    #[test]
    fn test_normalize_bounds_preview() {
        let mut item = bill_item();
        item.body = "x".repeat(2000);
        let normalizer = Normalizer::new(100, 50);
        let record = normalizer
            .normalize(&item, RecordType::General, &json!({}))
            .unwrap();
        assert_eq!(record.body_preview.chars().count(), 100);
    }

    #[test]
    fn test_normalize_date_falls_back_to_item_timestamp() {
        let raw = json!({"amount": 1.0});
        let record = Normalizer::default()
            .normalize(&bill_item(), RecordType::Bill, &raw)
            .unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn test_minimal_record_is_flagged() {
        let record = Normalizer::default().minimal(&bill_item(), RecordType::Bill);
        assert_eq!(record.record_type, RecordType::Bill);
        assert!(record.extraction_failed);
        assert!(record.amount.is_none());
        assert_eq!(record.sender, "billing@acme.com");
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount(&json!(42)), Some(42.0));
        assert_eq!(parse_amount(&json!(42.5)), Some(42.5));
        assert_eq!(parse_amount(&json!("$1,200.50")), Some(1200.5));
        assert_eq!(parse_amount(&json!("€99.99")), Some(99.99));
        assert_eq!(parse_amount(&json!(" 15.00 ")), Some(15.0));
        assert_eq!(parse_amount(&json!("free")), None);
        assert_eq!(parse_amount(&json!("")), None);
        assert_eq!(parse_amount(&json!(true)), None);
    }

    #[test]
    fn test_parse_calendar_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(parse_calendar_date("2025-03-15"), Some(expected));
        assert_eq!(parse_calendar_date("03/15/2025"), Some(expected));
        assert_eq!(parse_calendar_date("March 15, 2025"), Some(expected));
        assert_eq!(parse_calendar_date("15 Mar 2025"), Some(expected));
        assert_eq!(parse_calendar_date("2025-03-15T10:00:00Z"), Some(expected));
        assert_eq!(parse_calendar_date("soonish"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
