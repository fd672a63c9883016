//! Relevance classification for fetched mail.
//!
//! Decides, per source item, whether it is worth extracting and which
//! category it belongs to. The LLM classifier is consulted first; a
//! deterministic keyword scorer takes over when the backend is missing,
//! fails, or returns something unusable, so a scan degrades instead of
//! failing. `[ingest] relevance = "keyword"` forces the deterministic path.

use tracing::debug;

use epistle_llm::{ChatMessage, CompletionRequest, LlmBackend, SharedBackend};
use epistle_types::{RecordType, SourceItem};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of relevance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    /// Worth extracting, with the category to extract against.
    Relevant(RecordType),
    /// Not worth keeping. The item is discarded without a ledger entry so a
    /// later scan may reconsider it.
    Irrelevant,
}

/// Which classifier path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelevanceMode {
    /// LLM first, keyword scorer as fallback.
    #[default]
    Llm,
    /// Keyword scorer only.
    Keyword,
}

impl RelevanceMode {
    /// Parse the `[ingest] relevance` config value.
    pub fn parse(s: &str) -> Option<RelevanceMode> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Some(RelevanceMode::Llm),
            "keyword" | "keywords" => Some(RelevanceMode::Keyword),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter
// ─────────────────────────────────────────────────────────────────────────────

/// Classifies source items as a category or irrelevant.
pub struct RelevanceFilter {
    backend: Option<SharedBackend>,
    model: String,
    mode: RelevanceMode,
}

const RELEVANCE_MAX_TOKENS: u32 = 8;

impl RelevanceFilter {
    /// Keyword-scorer-only filter.
    pub fn keyword_only() -> Self {
        Self {
            backend: None,
            model: String::new(),
            mode: RelevanceMode::Keyword,
        }
    }

    /// LLM-first filter with keyword fallback.
    pub fn with_backend(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            model: model.into(),
            mode: RelevanceMode::Llm,
        }
    }

    pub fn with_mode(mut self, mode: RelevanceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Classify one item. Never errors.
    pub async fn classify(&self, item: &SourceItem) -> Relevance {
        if self.mode == RelevanceMode::Llm
            && let Some(relevance) = self.llm_classify(item).await
        {
            return relevance;
        }
        keyword_relevance(item)
    }

    /// Ask the backend for a category. `None` when no backend is configured,
    /// the call fails, or the answer parses to nothing usable.
    async fn llm_classify(&self, item: &SourceItem) -> Option<Relevance> {
        let backend = self.backend.as_ref()?;

        let request = CompletionRequest::new(
            &self.model,
            vec![ChatMessage::user(item.classification_text())],
            RELEVANCE_MAX_TOKENS,
        )
        .with_system(RELEVANCE_PROMPT)
        .with_temperature(0.0);

        let response = match backend.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(item = %item.id, error = %e, "Relevance call failed, using keyword scorer");
                return None;
            }
        };

        let answer = response.content.trim().to_lowercase();
        if matches!(answer.as_str(), "irrelevant" | "none" | "skip") {
            return Some(Relevance::Irrelevant);
        }
        match RecordType::parse(&answer) {
            Some(category) => Some(Relevance::Relevant(category)),
            None => {
                debug!(item = %item.id, raw = %answer, "Unusable relevance answer, using keyword scorer");
                None
            }
        }
    }
}

const RELEVANCE_PROMPT: &str = "You triage a personal mailbox. Given one email, respond with \
exactly one word: the best matching category from bill, university, promotion, order, shipping, \
banking, insurance, travel, tax, general, or the word irrelevant if the email is not worth \
keeping (greetings, newsletters, spam, social notifications). One word, nothing more.";

// ─────────────────────────────────────────────────────────────────────────────
// Keyword scorer
// ─────────────────────────────────────────────────────────────────────────────

/// Per-category cue phrases, matched as lowercase substrings.
const CATEGORY_KEYWORDS: &[(RecordType, &[&str])] = &[
    (
        RecordType::Bill,
        &["invoice", "bill", "amount due", "payment due", "utility", "electricity", "subscription"],
    ),
    (
        RecordType::University,
        &["university", "admission", "enrollment", "tuition", "semester", "campus"],
    ),
    (
        RecordType::Promotion,
        &["sale", "discount", "promo", "coupon", "% off", "limited offer"],
    ),
    (
        RecordType::Order,
        &["order", "receipt", "purchase", "order confirmation"],
    ),
    (
        RecordType::Shipping,
        &["shipped", "shipping", "tracking", "package", "out for delivery", "courier"],
    ),
    (
        RecordType::Banking,
        &["bank", "account statement", "transaction", "balance", "transfer", "direct debit"],
    ),
    (
        RecordType::Insurance,
        &["insurance", "policy", "premium", "claim", "coverage"],
    ),
    (
        RecordType::Travel,
        &["flight", "itinerary", "booking", "reservation", "boarding pass", "hotel"],
    ),
    (RecordType::Tax, &["tax", "irs", "vat", "filing deadline"]),
];

/// Deterministic relevance: distinct keyword hits over sender+subject+body.
///
/// The highest-scoring category wins. A single hit still ingests (logged as
/// low confidence); zero hits means irrelevant.
pub fn keyword_relevance(item: &SourceItem) -> Relevance {
    let text = item.classification_text().to_lowercase();

    let mut best: Option<(RecordType, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let hits = keywords.iter().filter(|k| text.contains(**k)).count();
        if hits > 0 && best.map(|(_, h)| hits > h).unwrap_or(true) {
            best = Some((*category, hits));
        }
    }

    match best {
        Some((category, hits)) => {
            let confidence = if hits >= 2 { "high" } else { "low" };
            debug!(item = %item.id, category = %category, hits, confidence, "Keyword relevance");
            Relevance::Relevant(category)
        }
        None => Relevance::Irrelevant,
    }
}
