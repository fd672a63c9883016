//! LLM field extraction and payload parsing.
//!
//! Turns one source item into a [`StructuredRecord`] via the backend:
//! build a category-specific prompt, parse the reply as JSON, validate
//! through the [`Normalizer`]. Malformed or schema-violating output gets one
//! retry with a stricter prompt; if that also fails the item degrades to a
//! minimal record instead of being dropped. Only transport errors (the
//! backend itself failing after its own retries) propagate to the caller.

use serde_json::Value;
use tracing::warn;

use epistle_llm::{ChatMessage, CompletionRequest, LlmBackend, SharedBackend};
use epistle_types::{Normalizer, RecordType, SourceItem, StructuredRecord};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Extractor
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts category fields from mail text through an LLM backend.
pub struct FieldExtractor {
    backend: SharedBackend,
    model: String,
}

const EXTRACT_MAX_TOKENS: u32 = 512;

/// Caps on prompt input, in characters. Long bodies and attachment dumps are
/// cut rather than ballooning token cost.
const BODY_CHAR_CAP: usize = 6000;
const ATTACHMENT_CHAR_CAP: usize = 6000;

impl FieldExtractor {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    /// Extract and normalize a record for `item`.
    ///
    /// Never fails on bad model output: one strict retry, then a minimal
    /// record. Backend transport errors propagate.
    pub async fn extract_record(
        &self,
        item: &SourceItem,
        category: RecordType,
        attachment_text: Option<&str>,
        normalizer: &Normalizer,
    ) -> Result<StructuredRecord> {
        match self.attempt(item, category, attachment_text, false).await? {
            Some(payload) => match normalizer.normalize(item, category, &payload) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Extraction payload failed validation, retrying strict");
                }
            },
            None => {
                warn!(item = %item.id, "Extraction output was not JSON, retrying strict");
            }
        }

        match self.attempt(item, category, attachment_text, true).await? {
            Some(payload) => match normalizer.normalize(item, category, &payload) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Strict retry still invalid, writing minimal record");
                }
            },
            None => {
                warn!(item = %item.id, "Strict retry output was not JSON, writing minimal record");
            }
        }

        Ok(normalizer.minimal(item, category))
    }

    /// One extraction call. `Ok(None)` when the reply holds no JSON object.
    async fn attempt(
        &self,
        item: &SourceItem,
        category: RecordType,
        attachment_text: Option<&str>,
        strict: bool,
    ) -> Result<Option<Value>> {
        let prompt = build_prompt(item, category, attachment_text, strict);
        let request =
            CompletionRequest::new(&self.model, vec![ChatMessage::user(prompt)], EXTRACT_MAX_TOKENS)
                .with_temperature(0.0);

        let response = self.backend.complete(request).await?;
        Ok(parse_payload(&response.content))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────────────────────────────────────

fn build_prompt(
    item: &SourceItem,
    category: RecordType,
    attachment_text: Option<&str>,
    strict: bool,
) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You extract structured fields from one email for a personal records assistant.\n",
    );
    prompt.push_str(&format!("The email is categorized as: {category}.\n\n"));
    prompt.push_str("Return a JSON object with exactly these keys:\n");
    prompt.push_str(field_spec(category));
    prompt.push_str("\nUse null for anything not stated in the email. Dates use YYYY-MM-DD.\n");

    prompt.push_str("\nEmail:\n");
    prompt.push_str(&format!("From: {}\n", item.sender));
    prompt.push_str(&format!("Subject: {}\n", item.subject));
    prompt.push_str(&format!("Received: {}\n\n", item.timestamp.format("%Y-%m-%d")));
    prompt.push_str(cap_chars(&item.body, BODY_CHAR_CAP));
    prompt.push('\n');

    if let Some(text) = attachment_text {
        prompt.push_str("\nAttachment text:\n");
        prompt.push_str(cap_chars(text, ATTACHMENT_CHAR_CAP));
        prompt.push('\n');
    }

    if strict {
        prompt.push_str(
            "\nYour previous reply was not a valid JSON object with the required keys. \
             Respond with ONLY the JSON object, starting with { and ending with }.\n",
        );
    } else {
        prompt.push_str("\nRespond with ONLY the JSON object. No markdown, no explanation.\n");
    }

    prompt
}

/// The keys the model must produce for each category.
fn field_spec(category: RecordType) -> &'static str {
    if category.is_financial() {
        return r#"{"amount": <number>, "vendor": "<who is charging>", "due_date": "<YYYY-MM-DD or null>", "summary": "<one sentence>"}"#;
    }
    match category {
        RecordType::Travel => {
            r#"{"vendor": "<carrier or agency>", "due_date": "<departure date or null>", "amount": <number or null>, "summary": "<one sentence>"}"#
        }
        RecordType::Shipping => {
            r#"{"vendor": "<merchant or courier>", "due_date": "<expected delivery date or null>", "summary": "<one sentence>"}"#
        }
        RecordType::University => {
            r#"{"vendor": "<institution>", "due_date": "<response deadline or null>", "summary": "<the decision or request and its next step>"}"#
        }
        RecordType::Promotion => {
            r#"{"vendor": "<merchant>", "summary": "<the offer in one sentence>"}"#
        }
        _ => r#"{"summary": "<one sentence>"}"#,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse LLM output into a JSON object.
///
/// Handles the usual failure modes: markdown code fences around the object
/// and prose before or after it. Returns `None` when no object can be
/// recovered; the caller decides whether to retry.
pub(crate) fn parse_payload(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned)
        && value.is_object()
    {
        return Some(value);
    }

    if let Some(json_str) = extract_json_object(cleaned)
        && let Ok(value) = serde_json::from_str::<Value>(json_str)
        && value.is_object()
    {
        return Some(value);
    }

    None
}

/// Strip markdown code fences from LLM output.
fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();

    if let Some(rest) = s.strip_prefix("```json")
        && let Some(inner) = rest.strip_suffix("```")
    {
        return inner.trim();
    }
    if let Some(rest) = s.strip_prefix("```")
        && let Some(inner) = rest.strip_suffix("```")
    {
        return inner.trim();
    }

    s
}

/// Try to find a top-level JSON object `{...}` in the text.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end > start { Some(&s[start..=end]) } else { None }
}

/// Cut at a char boundary without allocating.
fn cap_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use epistle_llm::MockBackend;
    use std::sync::Arc;

    fn bill_item() -> SourceItem {
        SourceItem::new(
            "msg-1",
            "billing@powerco.example",
            "Your March invoice",
            Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap(),
            "Amount due: $142.75 by March 15.",
        )
    }

    const VALID_BILL: &str = r#"{"amount": 142.75, "vendor": "PowerCo", "due_date": "2025-03-15", "summary": "March electricity bill"}"#;

    #[tokio::test]
    async fn test_extract_happy_path() {
        let backend = Arc::new(MockBackend::with_text(VALID_BILL));
        let extractor = FieldExtractor::new(backend.clone(), "mock-model");

        let record = extractor
            .extract_record(&bill_item(), RecordType::Bill, None, &Normalizer::default())
            .await
            .unwrap();

        assert_eq!(record.amount, Some(142.75));
        assert_eq!(record.vendor.as_deref(), Some("PowerCo"));
        assert!(!record.extraction_failed);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_output_retries_strict_once() {
        let backend = Arc::new(MockBackend::with_texts(vec![
            "sorry, I cannot help with that".to_string(),
            VALID_BILL.to_string(),
        ]));
        let extractor = FieldExtractor::new(backend.clone(), "mock-model");

        let record = extractor
            .extract_record(&bill_item(), RecordType::Bill, None, &Normalizer::default())
            .await
            .unwrap();

        assert_eq!(record.amount, Some(142.75));
        assert_eq!(backend.request_count(), 2);

        let requests = backend.requests();
        let second = &requests[1].messages[0].content;
        assert!(second.contains("previous reply was not a valid JSON object"));
    }

    #[tokio::test]
    async fn test_schema_violation_retries_then_minimal() {
        // Bill without an amount fails normalization both times.
        let bad = r#"{"vendor": "PowerCo", "summary": "a bill"}"#;
        let backend = Arc::new(MockBackend::with_texts(vec![
            bad.to_string(),
            bad.to_string(),
        ]));
        let extractor = FieldExtractor::new(backend.clone(), "mock-model");

        let record = extractor
            .extract_record(&bill_item(), RecordType::Bill, None, &Normalizer::default())
            .await
            .unwrap();

        assert_eq!(backend.request_count(), 2);
        assert_eq!(record.record_type, RecordType::Bill);
        assert!(record.extraction_failed);
        assert!(record.amount.is_none());
        assert_eq!(record.sender, "billing@powerco.example");
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let extractor = FieldExtractor::new(backend, "mock-model");

        let err = extractor
            .extract_record(&bill_item(), RecordType::Bill, None, &Normalizer::default())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AgentError::Llm(_)));
    }

    #[tokio::test]
    async fn test_prompt_carries_attachment_text() {
        let backend = Arc::new(MockBackend::with_text(VALID_BILL));
        let extractor = FieldExtractor::new(backend.clone(), "mock-model");

        extractor
            .extract_record(
                &bill_item(),
                RecordType::Bill,
                Some("INVOICE PDF TEXT"),
                &Normalizer::default(),
            )
            .await
            .unwrap();

        let requests = backend.requests();
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("Attachment text:"));
        assert!(prompt.contains("INVOICE PDF TEXT"));
        assert!(prompt.contains("categorized as: bill"));
        assert!(prompt.contains(r#""amount": <number>"#));
    }

    #[test]
    fn test_parse_payload_with_fences() {
        let raw = "```json\n{\"amount\": 5}\n```";
        let value = parse_payload(raw).unwrap();
        assert_eq!(value["amount"], 5);
    }

    #[test]
    fn test_parse_payload_with_surrounding_prose() {
        let raw = "Here you go:\n\n{\"vendor\": \"Acme\"}\n\nHope that helps!";
        let value = parse_payload(raw).unwrap();
        assert_eq!(value["vendor"], "Acme");
    }

    #[test]
    fn test_parse_payload_rejects_non_objects() {
        assert!(parse_payload("[1, 2, 3]").is_none());
        assert!(parse_payload("just some words").is_none());
        assert!(parse_payload("").is_none());
    }

    #[test]
    fn test_cap_chars_boundary() {
        assert_eq!(cap_chars("héllo", 2), "hé");
        assert_eq!(cap_chars("hi", 10), "hi");
    }
}
