//! The ingestion pipeline: fetch, dedupe, filter, extract, commit.
//!
//! One scan lists candidate messages from the connector, then processes
//! each item independently on a bounded worker pool (LLM and OCR calls
//! dominate latency). Containment is per item: a failing item lands in the
//! [`IngestionReport`] and the batch continues. Only store corruption
//! aborts the run.
//!
//! Each item that survives relevance filtering becomes exactly one
//! [`StructuredRecord`](epistle_types::StructuredRecord), committed together
//! with its dedup entry, embedding, and reminder schedule in a single
//! transaction, so a cancelled run never leaves half an item behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use epistle_extract::{SharedExtractor, TextExtractor};
use epistle_llm::{Embedder, SharedEmbedder};
use epistle_mail::{ConnectorError, MailConnector, SharedConnector};
use epistle_store::{CommitOutcome, RecordStore, ScanSummary};
use epistle_types::{
    Channel, IngestionReport, Normalizer, RecordType, Reminder, SourceItem, StructuredRecord,
    TimeWindow,
};

use crate::error::{AgentError, Result};
use crate::extraction::FieldExtractor;
use crate::relevance::{Relevance, RelevanceFilter};

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_MAX_IN_FLIGHT: usize = 4;
const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 60;

const CONNECTOR_RETRIES: u32 = 2;
const CONNECTOR_BACKOFF_MS: u64 = 250;

/// Per-item processing outcome, aggregated into the report.
enum ItemOutcome {
    Duplicate,
    Irrelevant,
    Extracted,
}

/// Turns mailbox items into committed structured records.
pub struct IngestPipeline {
    connector: SharedConnector,
    extractor: SharedExtractor,
    store: Arc<RecordStore>,
    relevance: RelevanceFilter,
    fields: Option<FieldExtractor>,
    embedder: Option<SharedEmbedder>,
    normalizer: Normalizer,
    days_before: Vec<i64>,
    channel: Channel,
    recipient: String,
    max_in_flight: usize,
    item_timeout: Duration,
}

impl IngestPipeline {
    /// Pipeline with deterministic keyword relevance and no LLM extraction:
    /// every relevant item becomes a minimal record. Attach collaborators
    /// with the builder methods.
    pub fn new(
        connector: SharedConnector,
        extractor: SharedExtractor,
        store: Arc<RecordStore>,
    ) -> Self {
        Self {
            connector,
            extractor,
            store,
            relevance: RelevanceFilter::keyword_only(),
            fields: None,
            embedder: None,
            normalizer: Normalizer::default(),
            days_before: vec![3, 1],
            channel: Channel::Console,
            recipient: String::new(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            item_timeout: Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS),
        }
    }

    pub fn with_relevance(mut self, relevance: RelevanceFilter) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_field_extractor(mut self, fields: FieldExtractor) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_embedder(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_reminder_policy(
        mut self,
        days_before: Vec<i64>,
        channel: Channel,
        recipient: impl Into<String>,
    ) -> Self {
        self.days_before = days_before;
        self.channel = channel;
        self.recipient = recipient.into();
        self
    }

    pub fn with_limits(mut self, max_in_flight: usize, item_timeout_secs: u64) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self.item_timeout = Duration::from_secs(item_timeout_secs);
        self
    }

    /// Run one scan.
    ///
    /// `category` narrows both the connector listing (as a free-text hint)
    /// and nothing else; the relevance filter still decides each item's
    /// category. `force` re-ingests items the store has already seen,
    /// replacing their records.
    pub async fn run(
        &self,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
        force: bool,
    ) -> Result<IngestionReport> {
        let hint = category.map(|c| c.as_str());
        let items = self
            .connector_retry("list_messages", || {
                self.connector.list_messages(window, hint)
            })
            .await?;

        let mut report = IngestionReport::new();
        report.fetched = items.len();
        info!(fetched = report.fetched, ?category, force, "Scan started");

        let outcomes: Vec<_> = stream::iter(items)
            .map(|item| async move {
                let id = item.id.clone();
                let result =
                    tokio::time::timeout(self.item_timeout, self.process_item(&item, force)).await;
                (id, result)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        for (id, result) in outcomes {
            match result {
                Ok(Ok(ItemOutcome::Extracted)) => report.extracted += 1,
                Ok(Ok(ItemOutcome::Duplicate)) => report.skipped_duplicate += 1,
                Ok(Ok(ItemOutcome::Irrelevant)) => report.irrelevant += 1,
                Ok(Err(e)) => {
                    if let AgentError::Store(store_err) = &e
                        && store_err.is_corruption()
                    {
                        return Err(e);
                    }
                    warn!(source_id = %id, error = %e, "Item failed");
                    report.record_failure(&id, &e);
                }
                Err(_) => {
                    let e = AgentError::Timeout(self.item_timeout.as_secs());
                    warn!(source_id = %id, "Item timed out");
                    report.record_failure(&id, &e);
                }
            }
        }

        self.store.set_last_scan(&ScanSummary {
            at: Utc::now(),
            scanned: report.fetched,
            ingested: report.extracted,
            duplicates: report.skipped_duplicate,
            irrelevant: report.irrelevant,
            failed: report.failed,
        })?;

        info!(%report, "Scan finished");
        Ok(report)
    }

    // ── Per-item steps ───────────────────────────────────────────────────────

    async fn process_item(&self, item: &SourceItem, force: bool) -> Result<ItemOutcome> {
        if force {
            if self.store.remove_source(&item.id)? {
                debug!(source_id = %item.id, "Removed stored record for forced re-scan");
            }
        } else if self.store.is_seen(&item.id)? {
            debug!(source_id = %item.id, "Already ingested, skipping");
            return Ok(ItemOutcome::Duplicate);
        }

        let category = match self.relevance.classify(item).await {
            Relevance::Relevant(category) => category,
            // Not recorded as seen: a future scan may re-evaluate it.
            Relevance::Irrelevant => {
                debug!(source_id = %item.id, "Irrelevant, discarded");
                return Ok(ItemOutcome::Irrelevant);
            }
        };

        let attachment_text = self.attachment_text(item).await;
        let attachments_degraded = item.has_attachments() && attachment_text.is_none();

        let mut record = match &self.fields {
            Some(fields) => {
                fields
                    .extract_record(item, category, attachment_text.as_deref(), &self.normalizer)
                    .await?
            }
            None => self.normalizer.minimal(item, category),
        };
        if attachments_degraded {
            record.extraction_failed = true;
        }

        let embedding = self.embed(&record).await;
        let reminders =
            Reminder::schedule(&record, &self.days_before, self.channel, self.recipient.as_str());

        match self
            .store
            .commit_record(&record, embedding.as_deref(), &reminders)?
        {
            CommitOutcome::Committed => {
                info!(
                    source_id = %item.id,
                    record_id = %record.id,
                    category = %category,
                    reminders = reminders.len(),
                    "Record ingested"
                );
                Ok(ItemOutcome::Extracted)
            }
            CommitOutcome::Duplicate => {
                debug!(source_id = %item.id, "Concurrent commit won, counting as duplicate");
                Ok(ItemOutcome::Duplicate)
            }
        }
    }

    /// Fetch and extract text from every attachment on the item.
    ///
    /// Any failure degrades to `None` (body-only extraction); the item is
    /// never failed for its attachments.
    async fn attachment_text(&self, item: &SourceItem) -> Option<String> {
        if !item.has_attachments() {
            return None;
        }

        let mut chunks = Vec::new();
        for attachment in &item.attachments {
            let bytes = match self
                .connector_retry("fetch_attachment", || {
                    self.connector.fetch_attachment(&item.id, &attachment.id)
                })
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        source_id = %item.id,
                        attachment = %attachment.filename,
                        error = %e,
                        "Attachment fetch failed, proceeding with body only"
                    );
                    continue;
                }
            };

            match self
                .extractor
                .extract_text(&bytes, attachment.mime_type.as_deref(), &attachment.filename)
                .await
            {
                Ok(text) if !text.trim().is_empty() => chunks.push(text),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        source_id = %item.id,
                        attachment = %attachment.filename,
                        error = %e,
                        "Attachment text extraction failed, proceeding with body only"
                    );
                }
            }
        }

        if chunks.is_empty() {
            None
        } else {
            Some(chunks.join("\n\n"))
        }
    }

    /// Embed the record for semantic retrieval. Failure degrades to an
    /// unembedded record; `reindex` can backfill later.
    async fn embed(&self, record: &StructuredRecord) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        if !self.store.has_vectors() {
            return None;
        }

        match embedder.embed(&record.embedding_text()).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Embedding failed, record stays unindexed");
                None
            }
        }
    }

    /// Retry a connector call with exponential backoff on retryable errors.
    async fn connector_retry<F, Fut, T>(
        &self,
        op: &str,
        mut f: F,
    ) -> std::result::Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ConnectorError>>,
    {
        let mut last_error = None;
        let mut backoff = Duration::from_millis(CONNECTOR_BACKOFF_MS);

        for attempt in 0..=CONNECTOR_RETRIES {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);

                    if attempt < CONNECTOR_RETRIES {
                        warn!(
                            op,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            "Connector call failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use epistle_extract::{MIME_PDF, MockExtractor};
    use epistle_llm::{
        CompletionRequest, CompletionResponse, Embedder, LlmBackend, LlmError, MockBackend,
        MockEmbedder, Usage,
    };
    use epistle_mail::MockConnector;
    use epistle_types::AttachmentRef;

    fn bill_item(id: &str) -> SourceItem {
        SourceItem::new(
            id,
            "billing@powerco.example",
            "Your electricity bill",
            Utc::now() - chrono::Duration::days(1),
            "Amount due: $142.75. Payment due by 2025-03-15.",
        )
    }

    fn university_item(id: &str) -> SourceItem {
        SourceItem::new(
            id,
            "admissions@state-university.example",
            "Admission decision",
            Utc::now() - chrono::Duration::days(2),
            "Congratulations on your university admission. Enrollment for the fall semester opens Monday.",
        )
    }

    fn chatter_item(id: &str) -> SourceItem {
        SourceItem::new(
            id,
            "alice@friends.example",
            "Lunch on Friday?",
            Utc::now() - chrono::Duration::days(1),
            "See you at noon by the park.",
        )
    }

    fn store() -> Arc<RecordStore> {
        Arc::new(RecordStore::open_in_memory().unwrap())
    }

    fn pipeline(connector: MockConnector, store: Arc<RecordStore>) -> IngestPipeline {
        IngestPipeline::new(Arc::new(connector), Arc::new(MockExtractor::new()), store)
    }

    const BILL_JSON: &str = r#"{"amount": 142.75, "vendor": "PowerCo", "due_date": "2025-03-15", "summary": "March electricity bill"}"#;

    #[tokio::test]
    async fn test_scan_ingests_relevant_items_and_reports() {
        let store = store();
        let connector = MockConnector::with_items(vec![
            bill_item("m1"),
            university_item("m2"),
            chatter_item("m3"),
        ]);
        let pipeline = pipeline(connector, store.clone());

        let report = pipeline.run(None, None, false).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.irrelevant, 1);
        assert_eq!(report.skipped_duplicate, 0);
        assert!(report.is_clean());
        assert_eq!(store.count_records(None).unwrap(), 2);

        // Irrelevant items are not recorded as seen.
        assert!(!store.is_seen("m3").unwrap());

        let summary = store.last_scan().unwrap().unwrap();
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.ingested, 2);
        assert_eq!(summary.irrelevant, 1);
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let store = store();
        let items = vec![bill_item("m1"), university_item("m2"), chatter_item("m3")];
        let pipeline = pipeline(MockConnector::with_items(items), store.clone());

        let first = pipeline.run(None, None, false).await.unwrap();
        let second = pipeline.run(None, None, false).await.unwrap();

        assert_eq!(second.extracted, 0);
        assert_eq!(second.skipped_duplicate, first.extracted);
        // Irrelevant items get re-evaluated each scan.
        assert_eq!(second.irrelevant, 1);
        assert_eq!(store.count_records(None).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_university_plus_duplicate_bill() {
        let store = store();

        let seed = pipeline(MockConnector::with_items(vec![bill_item("m1")]), store.clone());
        seed.run(None, None, false).await.unwrap();

        let second = pipeline(
            MockConnector::with_items(vec![university_item("m2"), bill_item("m1")]),
            store.clone(),
        );
        let report = second.run(None, None, false).await.unwrap();

        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped_duplicate, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.count_records(None).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_force_rescan_replaces_records() {
        let store = store();
        let items = vec![bill_item("m1")];
        let pipeline = pipeline(MockConnector::with_items(items), store.clone());

        pipeline.run(None, None, false).await.unwrap();
        let original_id = store.list_records(&Default::default()).unwrap()[0].id.clone();

        let report = pipeline.run(None, None, true).await.unwrap();

        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped_duplicate, 0);
        assert_eq!(store.count_records(None).unwrap(), 1);

        let replacement_id = store.list_records(&Default::default()).unwrap()[0].id.clone();
        assert_ne!(original_id, replacement_id);
    }

    #[tokio::test]
    async fn test_llm_extraction_populates_fields_and_reminders() {
        let store = store();
        let backend = Arc::new(MockBackend::with_text(BILL_JSON));
        let pipeline = pipeline(MockConnector::with_items(vec![bill_item("m1")]), store.clone())
            .with_field_extractor(FieldExtractor::new(backend, "test-model"))
            .with_reminder_policy(vec![3, 1], Channel::Console, "me@example.com");

        let report = pipeline.run(None, None, false).await.unwrap();
        assert_eq!(report.extracted, 1);

        let records = store.list_records(&Default::default()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.record_type, RecordType::Bill);
        assert_eq!(record.amount, Some(142.75));
        assert_eq!(record.vendor.as_deref(), Some("PowerCo"));
        assert!(!record.extraction_failed);

        // Due date produced a reminder per configured offset.
        let pending = store.pending_reminders().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].recipient, "me@example.com");
    }

    #[tokio::test]
    async fn test_item_failure_is_contained() {
        let store = store();
        // One response in the queue: the second item's extraction call errors.
        let backend = Arc::new(MockBackend::with_text(BILL_JSON));
        let pipeline = pipeline(
            MockConnector::with_items(vec![bill_item("m1"), bill_item("m2")]),
            store.clone(),
        )
        .with_field_extractor(FieldExtractor::new(backend, "test-model"))
        .with_limits(1, 60);

        let report = pipeline.run(None, None, false).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("m2:"));
        assert_eq!(store.count_records(None).unwrap(), 1);

        // The failed item was not dedup-recorded and can be retried.
        assert!(!store.is_seen("m2").unwrap());
    }

    #[tokio::test]
    async fn test_attachment_text_feeds_extraction_prompt() {
        let store = store();
        let item = bill_item("m1").with_attachment(AttachmentRef {
            id: "a1".to_string(),
            filename: "invoice.pdf".to_string(),
            mime_type: Some(MIME_PDF.to_string()),
        });
        let connector = MockConnector::with_items(vec![item])
            .add_attachment("m1", "a1", b"%PDF-1.4 fake".to_vec());

        let backend = Arc::new(MockBackend::with_text(BILL_JSON));
        let pipeline = IngestPipeline::new(
            Arc::new(connector),
            Arc::new(
                MockExtractor::new().with_response("invoice.pdf", "Total payable 142.75 EUR"),
            ),
            store.clone(),
        )
        .with_field_extractor(FieldExtractor::new(backend.clone(), "test-model"));

        let report = pipeline.run(None, None, false).await.unwrap();
        assert_eq!(report.extracted, 1);

        let prompt = &backend.requests()[0].messages[0].content;
        assert!(prompt.contains("Attachment text:"));
        assert!(prompt.contains("Total payable 142.75 EUR"));

        assert!(store.list_records(&Default::default()).unwrap()[0].has_attachments);
    }

    #[tokio::test]
    async fn test_attachment_failure_degrades_to_body_only() {
        let store = store();
        let item = bill_item("m1").with_attachment(AttachmentRef {
            id: "a1".to_string(),
            filename: "invoice.pdf".to_string(),
            mime_type: Some(MIME_PDF.to_string()),
        });
        // No attachment registered on the connector: fetch returns NotFound.
        let connector = MockConnector::with_items(vec![item]);

        let backend = Arc::new(MockBackend::with_text(BILL_JSON));
        let pipeline = pipeline(connector, store.clone())
            .with_field_extractor(FieldExtractor::new(backend, "test-model"));

        let report = pipeline.run(None, None, false).await.unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failed, 0);

        let record = &store.list_records(&Default::default()).unwrap()[0];
        assert!(record.has_attachments);
        assert!(record.extraction_failed);
        assert_eq!(record.amount, Some(142.75));
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let store = store();
        let connector = MockConnector::with_items(vec![bill_item("m1")]);
        connector.push_failure(ConnectorError::Connection("reset".to_string()));
        let connector = Arc::new(connector);

        let pipeline =
            IngestPipeline::new(connector.clone(), Arc::new(MockExtractor::new()), store);

        let report = pipeline.run(None, None, false).await.unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(connector.list_call_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_fails_the_scan_without_retry() {
        let store = store();
        let connector = MockConnector::with_items(vec![bill_item("m1")]);
        connector.push_failure(ConnectorError::Auth("expired token".to_string()));
        let connector = Arc::new(connector);

        let pipeline =
            IngestPipeline::new(connector.clone(), Arc::new(MockExtractor::new()), store);

        let err = pipeline.run(None, None, false).await.unwrap_err();
        assert!(matches!(err, AgentError::Mail(ConnectorError::Auth(_))));
        assert_eq!(connector.list_call_count(), 1);
    }

    /// Backend that hangs long enough to trip the per-item timeout.
    #[derive(Debug)]
    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CompletionResponse::new(
                "slow_msg",
                "slow-model",
                "{}",
                Usage::new(1, 1),
            ))
        }

        fn name(&self) -> &str {
            "slow"
        }

        async fn health_check(&self) -> std::result::Result<(), LlmError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_marks_item_failed_not_batch() {
        let store = store();
        let pipeline = pipeline(MockConnector::with_items(vec![bill_item("m1")]), store.clone())
            .with_field_extractor(FieldExtractor::new(Arc::new(SlowBackend), "slow-model"))
            .with_limits(4, 0);

        let report = pipeline.run(None, None, false).await.unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("Timed out"));
        assert_eq!(store.count_records(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embeddings_stored_when_vectors_ready() {
        epistle_store::init_vector_extension();

        let store = store();
        let embedder = Arc::new(MockEmbedder::default_dimensions());
        store
            .init_vectors(embedder.dimensions(), embedder.name())
            .unwrap();

        let pipeline = pipeline(MockConnector::with_items(vec![bill_item("m1")]), store.clone())
            .with_embedder(embedder.clone());

        let report = pipeline.run(None, None, false).await.unwrap();
        assert_eq!(report.extracted, 1);

        let record = &store.list_records(&Default::default()).unwrap()[0];
        let query = embedder.embed(&record.embedding_text()).await.unwrap();
        let similar = store.search_similar_records(&query, 1).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0.id, record.id);
    }

    #[tokio::test]
    async fn test_category_hint_narrows_listing() {
        let store = store();
        let connector = MockConnector::with_items(vec![bill_item("m1"), university_item("m2")]);
        let pipeline = pipeline(connector, store.clone());

        // The hint is matched against sender/subject/body by the connector.
        let report = pipeline
            .run(Some(RecordType::Bill), None, false)
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.extracted, 1);
        assert_eq!(store.count_records(None).unwrap(), 1);
        assert_eq!(
            store.list_records(&Default::default()).unwrap()[0].record_type,
            RecordType::Bill
        );
    }
}
