//! Core Agent implementation.
//!
//! The [`Agent`] struct is the front door of the system - it routes each
//! user turn to an intent, dispatches to the ingestion pipeline, retrieval
//! engine, spending analyzer, reminder scheduler, or alternatives finder,
//! and hands the result to the responder for phrasing.
//!
//! Every collaborator is optional except the mail connector and the record
//! store: without an LLM backend scans produce minimal records and answers
//! fall back to deterministic listings, without an embedder retrieval is
//! keyword-only, and without a web search provider the alternatives finder
//! answers from stored records alone.

use std::sync::Arc;

use tracing::{info, warn};

use epistle_config::{IngestSection, ReminderSection, RetrievalSection};
use epistle_extract::{DocumentExtractor, SharedExtractor};
use epistle_llm::{Embedder, SharedBackend, SharedEmbedder};
use epistle_mail::SharedConnector;
use epistle_notify::{SharedNotifier, build_notifier};
use epistle_store::{RecordStore, ReindexReport};
use epistle_types::{
    Channel, IngestionReport, Intent, IntentAction, Normalizer, RecordType, StructuredRecord,
    TimeWindow, TurnResponse,
};

use crate::alternatives::{SharedSearch, WebSearch, build_query};
use crate::analyze::SpendingAnalyzer;
use crate::error::{AgentError, Result};
use crate::extraction::FieldExtractor;
use crate::pipeline::IngestPipeline;
use crate::relevance::{RelevanceFilter, RelevanceMode};
use crate::reminders::{ReminderRunReport, ReminderScheduler};
use crate::responder::Responder;
use crate::retrieval::RetrievalEngine;
use crate::router::Router;

/// Web hits requested per alternatives search.
const MAX_ALTERNATIVES: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// The assembled mail agent: classify, dispatch, phrase.
pub struct Agent {
    /// Routes user turns to intents.
    router: Router,
    /// Fetches, filters, extracts and commits mail.
    pipeline: IngestPipeline,
    /// Semantic-plus-keyword search over stored records.
    retrieval: RetrievalEngine,
    /// Spending aggregation.
    analyzer: SpendingAnalyzer,
    /// Due-reminder delivery.
    scheduler: ReminderScheduler,
    /// Turns dispatch results into user-facing text.
    responder: Responder,
    /// Optional web search for the alternatives finder.
    search: Option<SharedSearch>,
    /// Optional embedder, kept for reindexing.
    embedder: Option<SharedEmbedder>,
    /// The record store, shared with every collaborator.
    store: Arc<RecordStore>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent builder for fluent construction.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Get the record store.
    pub fn store(&self) -> Arc<RecordStore> {
        self.store.clone()
    }

    /// Handle one user turn: classify it, dispatch it, phrase the result.
    pub async fn handle_user_turn(&self, text: &str) -> Result<TurnResponse> {
        let intent = self.router.classify(text).await;
        info!(action = %intent.action, "Dispatching user turn");

        match intent.action {
            IntentAction::Ingest => {
                let report = self
                    .run_scan(intent.category, intent.window.as_ref(), false)
                    .await?;
                Ok(self.responder.describe_scan(&report))
            }
            IntentAction::Query => {
                let hits = self
                    .retrieval
                    .search(&intent.raw_query, intent.category, intent.window.as_ref())
                    .await?;
                Ok(self.responder.answer_query(&intent.raw_query, hits).await)
            }
            IntentAction::Analyze => {
                let analysis = self.analyzer.analyze(intent.category, intent.window.as_ref())?;
                Ok(self.responder.describe_analysis(analysis))
            }
            IntentAction::FindAlternatives => self.dispatch_alternatives(&intent).await,
            IntentAction::Remind => {
                let pending = self.store.pending_reminders()?;
                Ok(self.responder.describe_reminder_list(&pending))
            }
            IntentAction::Unknown => Ok(self.responder.clarification(&intent.raw_query)),
        }
    }

    /// Run one ingestion scan.
    ///
    /// `force` re-ingests items the store has already seen, replacing their
    /// records.
    pub async fn run_scan(
        &self,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
        force: bool,
    ) -> Result<IngestionReport> {
        self.pipeline.run(category, window, force).await
    }

    /// Run one reminder delivery pass over everything currently due.
    pub async fn check_reminders(&self) -> Result<ReminderRunReport> {
        self.scheduler.check_now().await
    }

    /// Spawn the background reminder loop on the current runtime.
    pub fn spawn_reminder_loop(&self) -> tokio::task::JoinHandle<()> {
        self.scheduler.spawn()
    }

    /// Rebuild the embedding index with the configured embedder.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let Some(embedder) = self.embedder.clone() else {
            return Err(AgentError::Config(
                "reindex requires an embedding backend".to_string(),
            ));
        };
        let dims = embedder.dimensions();
        let provider = embedder.name().to_string();

        let report = self
            .store
            .reindex(
                move |texts: Vec<String>| {
                    let embedder = embedder.clone();
                    async move {
                        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                        embedder.embed_batch(&refs).await.map_err(|e| e.to_string())
                    }
                },
                dims,
                &provider,
            )
            .await?;
        Ok(report)
    }

    /// The alternatives dispatch: find the stored service under discussion,
    /// search the web for substitutes, phrase both together.
    async fn dispatch_alternatives(&self, intent: &Intent) -> Result<TurnResponse> {
        let records: Vec<StructuredRecord> = self
            .retrieval
            .search(&intent.raw_query, intent.category, intent.window.as_ref())
            .await?
            .into_iter()
            .map(|h| h.record)
            .collect();

        // Prefer a hit with an extracted vendor; minimal records fall back
        // to their sender as the service label.
        let source = records
            .iter()
            .find(|r| r.vendor.is_some())
            .or_else(|| records.first())
            .cloned();

        let Some(record) = source else {
            return Ok(TurnResponse::new(
                "I don't have a stored service matching that to compare against. \
                 Scan your mail first, or name the vendor as it appears in your records.",
                IntentAction::FindAlternatives,
            ));
        };

        let vendor = match &record.vendor {
            Some(vendor) => vendor.clone(),
            None => record.sender.clone(),
        };
        let amount = record.amount;
        let query = build_query(&vendor, amount);

        let hits = match &self.search {
            Some(search) => match search.search(&query, MAX_ALTERNATIVES).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, %query, "Alternatives search failed, answering from the stored record");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(self
            .responder
            .describe_alternatives(&vendor, amount, hits, Some(record)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for constructing an [`Agent`] with fluent API.
pub struct AgentBuilder {
    connector: Option<SharedConnector>,
    store: Option<Arc<RecordStore>>,
    extractor: Option<SharedExtractor>,
    backend: Option<SharedBackend>,
    model: String,
    embedder: Option<SharedEmbedder>,
    notifier: Option<SharedNotifier>,
    search: Option<SharedSearch>,
    ingest: IngestSection,
    retrieval: RetrievalSection,
    reminders: ReminderSection,
}

impl AgentBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            connector: None,
            store: None,
            extractor: None,
            backend: None,
            model: String::new(),
            embedder: None,
            notifier: None,
            search: None,
            ingest: IngestSection::default(),
            retrieval: RetrievalSection::default(),
            reminders: ReminderSection::default(),
        }
    }

    /// Set the mail connector. Required.
    pub fn with_connector(mut self, connector: SharedConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the record store. Required.
    pub fn with_store(mut self, store: Arc<RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the attachment text extractor. Defaults to [`DocumentExtractor`].
    pub fn with_extractor(mut self, extractor: SharedExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the LLM backend and the model it should be called with.
    pub fn with_backend(mut self, backend: SharedBackend, model: impl Into<String>) -> Self {
        self.backend = Some(backend);
        self.model = model.into();
        self
    }

    /// Set the embedder used for indexing and semantic retrieval.
    pub fn with_embedder(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the reminder notifier. Defaults to the configured channel's
    /// notifier from [`build_notifier`].
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the web search provider for the alternatives finder.
    pub fn with_search(mut self, search: SharedSearch) -> Self {
        self.search = Some(search);
        self
    }

    /// Set the ingestion tuning section.
    pub fn with_ingest(mut self, ingest: IngestSection) -> Self {
        self.ingest = ingest;
        self
    }

    /// Set the retrieval tuning section.
    pub fn with_retrieval(mut self, retrieval: RetrievalSection) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Set the reminder delivery section.
    pub fn with_reminders(mut self, reminders: ReminderSection) -> Self {
        self.reminders = reminders;
        self
    }

    /// Build the agent.
    pub fn build(self) -> Result<Agent> {
        let connector = self
            .connector
            .ok_or_else(|| AgentError::Config("mail connector is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| AgentError::Config("record store is required".to_string()))?;
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(DocumentExtractor::new()));

        if let Some(embedder) = &self.embedder {
            store.init_vectors(embedder.dimensions(), embedder.name())?;
        }

        let channel = Channel::parse(&self.reminders.channel).ok_or_else(|| {
            AgentError::Config(format!(
                "unknown reminder channel '{}'",
                self.reminders.channel
            ))
        })?;
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => build_notifier(channel, self.reminders.webhook_url.as_deref())?,
        };
        let recipient = self.reminders.recipient.clone().unwrap_or_default();

        let mode = RelevanceMode::parse(&self.ingest.relevance).ok_or_else(|| {
            AgentError::Config(format!(
                "unknown relevance mode '{}' (expected 'llm' or 'keyword')",
                self.ingest.relevance
            ))
        })?;
        let relevance = match (mode, &self.backend) {
            (RelevanceMode::Keyword, _) | (RelevanceMode::Llm, None) => {
                RelevanceFilter::keyword_only()
            }
            (RelevanceMode::Llm, Some(backend)) => {
                RelevanceFilter::with_backend(backend.clone(), &self.model)
            }
        };

        let mut pipeline = IngestPipeline::new(connector, extractor, store.clone())
            .with_relevance(relevance)
            .with_normalizer(Normalizer::new(
                self.ingest.preview_max,
                self.ingest.summary_max,
            ))
            .with_reminder_policy(self.reminders.days_before.clone(), channel, recipient)
            .with_limits(self.ingest.max_in_flight, self.ingest.item_timeout_secs);
        if let Some(backend) = &self.backend {
            pipeline =
                pipeline.with_field_extractor(FieldExtractor::new(backend.clone(), &self.model));
        }
        if let Some(embedder) = &self.embedder {
            pipeline = pipeline.with_embedder(embedder.clone());
        }

        let mut router = Router::new();
        let mut responder = Responder::new();
        if let Some(backend) = &self.backend {
            router = router.with_backend(backend.clone(), &self.model);
            responder = responder.with_backend(backend.clone(), &self.model);
        }

        let retrieval = RetrievalEngine::new(
            store.clone(),
            self.embedder.clone(),
            self.retrieval.top_k,
            self.retrieval.confidence_threshold,
        );
        let analyzer = SpendingAnalyzer::new(store.clone());
        let scheduler =
            ReminderScheduler::new(store.clone(), notifier, self.reminders.check_interval_secs);

        info!(
            llm = self.backend.is_some(),
            embeddings = self.embedder.is_some(),
            web_search = self.search.is_some(),
            "Agent assembled"
        );

        Ok(Agent {
            router,
            pipeline,
            retrieval,
            analyzer,
            scheduler,
            responder,
            search: self.search,
            embedder: self.embedder,
            store,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
