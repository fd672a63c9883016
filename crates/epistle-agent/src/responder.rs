//! Response assembly.
//!
//! Turns dispatch results into the [`TurnResponse`] handed back to the
//! caller. Query answers go through the LLM when a backend is configured,
//! prompted with the retrieved records and nothing else; without a backend,
//! or when the call fails, a deterministic formatter lists the matches.
//! Every other action has a deterministic phrasing.
//!
//! `records_used` always reports the records an answer was assembled from,
//! so the caller can show provenance.

use tracing::warn;

use epistle_llm::{ChatMessage, CompletionRequest, LlmBackend, SharedBackend};
use epistle_types::{
    IngestionReport, IntentAction, Reminder, SearchHit, StructuredRecord, TurnResponse,
};

use crate::alternatives::WebHit;
use crate::analyze::SpendingAnalysis;
use crate::reminders::ReminderRunReport;

// ─────────────────────────────────────────────────────────────────────────────
// Responder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles user-facing responses from dispatch results.
pub struct Responder {
    backend: Option<SharedBackend>,
    model: String,
}

const ANSWER_MAX_TOKENS: u32 = 512;

const ANSWER_PROMPT: &str = "You answer questions about a user's stored email records. \
Use ONLY the numbered records in the message; never invent facts. \
If the records do not contain the answer, say so plainly. \
Answer in one or two short sentences.";

impl Responder {
    /// Deterministic-formatting-only responder.
    pub fn new() -> Self {
        Self {
            backend: None,
            model: String::new(),
        }
    }

    /// Attach an LLM backend used to phrase query answers.
    pub fn with_backend(mut self, backend: SharedBackend, model: impl Into<String>) -> Self {
        self.backend = Some(backend);
        self.model = model.into();
        self
    }

    // ── Query ────────────────────────────────────────────────────────────────

    /// Answer a query from its retrieved records.
    pub async fn answer_query(&self, query: &str, hits: Vec<SearchHit>) -> TurnResponse {
        if hits.is_empty() {
            return TurnResponse::new(
                "No stored records match that. If the mail hasn't been ingested yet, \
                 run a scan first.",
                IntentAction::Query,
            );
        }

        let records: Vec<StructuredRecord> = hits.iter().map(|h| h.record.clone()).collect();

        if let Some(backend) = &self.backend {
            let context = records
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{}. {}", i + 1, render_record(r)))
                .collect::<Vec<_>>()
                .join("\n");

            let request = CompletionRequest::new(
                &self.model,
                vec![ChatMessage::user(format!(
                    "Records:\n{context}\n\nQuestion: {query}"
                ))],
                ANSWER_MAX_TOKENS,
            )
            .with_system(ANSWER_PROMPT)
            .with_temperature(0.2);

            match backend.complete(request).await {
                Ok(response) if !response.content.trim().is_empty() => {
                    return TurnResponse::new(response.content.trim(), IntentAction::Query)
                        .with_records(records);
                }
                Ok(_) => {
                    warn!("Answer synthesis returned empty text, listing records instead");
                }
                Err(e) => {
                    warn!(error = %e, "Answer synthesis failed, listing records instead");
                }
            }
        }

        TurnResponse::new(list_records(&records), IntentAction::Query).with_records(records)
    }

    // ── Deterministic phrasings ──────────────────────────────────────────────

    /// Phrase an ingestion run.
    pub fn describe_scan(&self, report: &IngestionReport) -> TurnResponse {
        let mut text = format!("Scan finished: {report}.");
        if !report.errors.is_empty() {
            text.push_str("\nProblems:");
            for error in &report.errors {
                text.push_str(&format!("\n  - {error}"));
            }
        }
        TurnResponse::new(text, IntentAction::Ingest)
    }

    /// Phrase a spending analysis.
    pub fn describe_analysis(&self, analysis: SpendingAnalysis) -> TurnResponse {
        let report = &analysis.report;
        if report.record_count == 0 {
            return TurnResponse::new(
                "No financial records found for that period.",
                IntentAction::Analyze,
            );
        }

        let mut text = format!(
            "You spent ${:.2} across {} record(s){}.",
            report.total,
            report.record_count,
            match (report.since, report.until) {
                (Some(since), Some(until)) => format!(" between {since} and {until}"),
                (Some(since), None) => format!(" since {since}"),
                (None, Some(until)) => format!(" up to {until}"),
                (None, None) => String::new(),
            }
        );

        if report.by_category.len() > 1 {
            text.push_str("\nBy category:");
            for row in &report.by_category {
                text.push_str(&format!(
                    "\n  - {}: ${:.2} ({} record(s))",
                    row.key, row.total, row.count
                ));
            }
        }

        if !report.by_vendor.is_empty() {
            text.push_str("\nTop vendors:");
            for row in report.by_vendor.iter().take(3) {
                text.push_str(&format!("\n  - {}: ${:.2}", row.key, row.total));
            }
        }

        let mut records_used = Vec::new();
        if let Some(largest) = analysis.largest {
            text.push_str(&format!(
                "\nLargest: ${:.2} to {} ({})",
                largest.amount.unwrap_or_default(),
                largest.vendor.as_deref().unwrap_or(&largest.sender),
                largest.subject
            ));
            records_used.push(largest);
        }

        TurnResponse::new(text, IntentAction::Analyze).with_records(records_used)
    }

    /// Phrase the pending-reminder listing.
    pub fn describe_reminder_list(&self, pending: &[Reminder]) -> TurnResponse {
        if pending.is_empty() {
            return TurnResponse::new("No pending reminders.", IntentAction::Remind);
        }

        let mut text = format!("{} pending reminder(s):", pending.len());
        for reminder in pending {
            text.push_str(&format!(
                "\n  - {} [fires {}]",
                reminder.message(),
                reminder.remind_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        TurnResponse::new(text, IntentAction::Remind)
    }

    /// Phrase one reminder delivery pass.
    pub fn describe_reminder_run(&self, report: &ReminderRunReport) -> TurnResponse {
        TurnResponse::new(format!("Reminder check: {report}."), IntentAction::Remind)
    }

    /// Phrase the alternatives search result.
    ///
    /// With no web hits (search failed or found nothing) the answer degrades
    /// to what the stored record says.
    pub fn describe_alternatives(
        &self,
        vendor: &str,
        amount: Option<f64>,
        mut hits: Vec<WebHit>,
        source: Option<StructuredRecord>,
    ) -> TurnResponse {
        let paying = match amount {
            Some(amount) => format!(" (you currently pay ${amount:.2})"),
            None => String::new(),
        };

        let text = if hits.is_empty() {
            format!(
                "I couldn't find web results for alternatives to {vendor}{paying}. \
                 Try again later."
            )
        } else {
            // Priced hits first, cheapest first; unpriced keep their order.
            hits.sort_by(|a, b| match (a.price, b.price) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });

            let mut text = format!("Possible alternatives to {vendor}{paying}:");
            for hit in &hits {
                text.push_str(&format!("\n  - {}", hit.title));
                if let Some(price) = hit.price {
                    text.push_str(&format!(" (about ${price:.2})"));
                }
                if !hit.url.is_empty() {
                    text.push_str(&format!(" | {}", hit.url));
                }
            }
            text
        };

        let mut response = TurnResponse::new(text, IntentAction::FindAlternatives);
        if let Some(source) = source {
            response = response.with_records(vec![source]);
        }
        response
    }

    /// Response for input the router could not place.
    pub fn clarification(&self, raw_query: &str) -> TurnResponse {
        TurnResponse::new(
            format!(
                "I'm not sure what to do with \"{raw_query}\". I can scan your inbox \
                 for new mail, answer questions about stored records, total your \
                 spending, look for cheaper alternatives, or list payment reminders."
            ),
            IntentAction::Unknown,
        )
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record formatting
// ─────────────────────────────────────────────────────────────────────────────

/// One-line rendering of a record, used in both prompts and listings.
pub(crate) fn render_record(record: &StructuredRecord) -> String {
    let mut line = format!(
        "[{}] {} | from {} | {}",
        record.record_type, record.date, record.sender, record.subject
    );
    if let Some(vendor) = &record.vendor {
        line.push_str(&format!(" | vendor {vendor}"));
    }
    if let Some(amount) = record.amount {
        line.push_str(&format!(" | ${amount:.2}"));
    }
    if let Some(due) = record.due_date {
        line.push_str(&format!(" | due {due}"));
    }
    if !record.summary.is_empty() && record.summary != record.subject {
        line.push_str(&format!(" | {}", record.summary));
    }
    line
}

fn list_records(records: &[StructuredRecord]) -> String {
    let mut text = format!("Found {} matching record(s):", records.len());
    for record in records {
        text.push_str(&format!("\n  - {}", render_record(record)));
    }
    text
}
