//! Semantic retrieval over indexed records, with keyword fallback.
//!
//! Read-only: indexing happens in the ingestion pipeline, this module only
//! queries. Vector search runs first when an embedder and index are
//! available; when the best similarity falls below the configured
//! confidence threshold, a substring search over sender/subject/vendor
//! joins in. The merged list is deduplicated by `source_id` with the
//! embedding-ranked hits first, and keyword hits are guaranteed seats
//! within `top_k` so an exact sender match is never silently cut.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use epistle_llm::{Embedder, SharedEmbedder};
use epistle_store::RecordStore;
use epistle_types::{MatchOrigin, RecordType, SearchHit, StructuredRecord, TimeWindow};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Retrieval over the record store.
pub struct RetrievalEngine {
    store: Arc<RecordStore>,
    embedder: Option<SharedEmbedder>,
    top_k: usize,
    confidence_threshold: f32,
}

/// Vector search fetches extra rows since category/date filters apply after.
const SEARCH_OVERFETCH: usize = 3;

impl RetrievalEngine {
    pub fn new(
        store: Arc<RecordStore>,
        embedder: Option<SharedEmbedder>,
        top_k: usize,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k,
            confidence_threshold,
        }
    }

    /// Search indexed records, most relevant first.
    ///
    /// An empty result is a successful empty vector, never an error.
    pub async fn search(
        &self,
        query: &str,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
    ) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.semantic_hits(query, category, window).await?;

        let confident = hits
            .first()
            .map(|h| h.score >= self.confidence_threshold)
            .unwrap_or(false);
        if confident {
            return Ok(hits);
        }

        let mut keyword = self.keyword_hits(query, category, window)?;
        keyword.retain(|k| {
            !hits
                .iter()
                .any(|h| h.record.source_id == k.record.source_id)
        });
        keyword.truncate(self.top_k);

        debug!(
            semantic = hits.len(),
            keyword = keyword.len(),
            "Semantic confidence below threshold, merging keyword matches"
        );

        let keep = self.top_k.saturating_sub(keyword.len());
        hits.truncate(keep);
        hits.extend(keyword);
        Ok(hits)
    }

    /// Vector search, filtered and sorted. Empty when no embedder is
    /// configured, the index is absent, or the query fails to embed.
    async fn semantic_hits(
        &self,
        query: &str,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
    ) -> Result<Vec<SearchHit>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        if !self.store.has_vectors() {
            return Ok(Vec::new());
        }

        let embedding = match embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                debug!(error = %e, "Query embedding failed, skipping semantic search");
                return Ok(Vec::new());
            }
        };

        let mut hits: Vec<SearchHit> = self
            .store
            .search_similar_records(&embedding, self.top_k * SEARCH_OVERFETCH)?
            .into_iter()
            .filter(|(record, _)| matches_filters(record, category, window))
            .map(|(record, distance)| SearchHit {
                score: similarity_from_distance(distance),
                record,
                origin: MatchOrigin::Semantic,
            })
            .collect();

        // Equal scores break toward the more recent record.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.record.date.cmp(&a.record.date))
        });
        hits.truncate(self.top_k);
        Ok(hits)
    }

    /// Substring search over sender/subject/vendor/summary.
    ///
    /// The full query is tried first; when it matches nothing (queries are
    /// usually sentences, stored fields are not), individual significant
    /// tokens are tried instead.
    fn keyword_hits(
        &self,
        query: &str,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
    ) -> Result<Vec<SearchHit>> {
        let mut records = self.store.search_records(query, self.top_k)?;

        if records.is_empty() {
            for token in significant_tokens(query) {
                for record in self.store.search_records(&token, self.top_k)? {
                    if !records.iter().any(|r| r.source_id == record.source_id) {
                        records.push(record);
                    }
                }
                if records.len() >= self.top_k {
                    break;
                }
            }
        }

        records.retain(|r| matches_filters(r, category, window));
        records.truncate(self.top_k);

        Ok(records
            .into_iter()
            .map(|record| SearchHit {
                record,
                score: 0.0,
                origin: MatchOrigin::Keyword,
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// sqlite-vec reports L2 distance; embeddings are unit vectors, so
/// `d^2 = 2 - 2cos` and cosine similarity recovers as `1 - d^2/2`.
fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - (distance * distance) / 2.0
}

fn matches_filters(
    record: &StructuredRecord,
    category: Option<RecordType>,
    window: Option<&TimeWindow>,
) -> bool {
    if let Some(category) = category
        && record.record_type != category
    {
        return false;
    }
    if let Some(window) = window {
        let date = record.date;
        if date < window.since.date_naive() || date > window.until.date_naive() {
            return false;
        }
    }
    true
}

/// Query tokens worth searching on their own: four letters or more, not
/// interrogative filler.
fn significant_tokens(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "what", "when", "where", "which", "about", "from", "show", "have", "this", "that", "with",
        "anything", "there", "email", "emails", "mail", "did", "me", "my", "the", "was", "were",
    ];
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 4)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}
