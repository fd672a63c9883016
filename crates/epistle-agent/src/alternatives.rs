//! Web search for cheaper alternatives to a stored service.
//!
//! Backs the `FindAlternatives` intent: the dispatcher first retrieves the
//! stored record for the vendor under discussion, then searches the web for
//! competitors, pulling prices out of result snippets where it can. Search
//! failure never fails the turn; the responder degrades to a records-only
//! answer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::{AgentError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// One web search result, with a price when the snippet names one.
#[derive(Debug, Clone, PartialEq)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub price: Option<f64>,
}

/// Web search capability.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web, returning up to `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// A shared search client usable across tasks.
pub type SharedSearch = Arc<dyn WebSearch>;

/// Build the search query for a vendor and its current cost.
pub fn build_query(vendor: &str, amount: Option<f64>) -> String {
    match amount {
        Some(amount) => format!("cheaper alternative to {vendor} under ${amount:.2}"),
        None => format!("cheaper alternative to {vendor} comparison"),
    }
}

/// Pull a price out of snippet text.
///
/// Understands "$19.99", "19.99/mo" and "19.99 dollars". The first match
/// wins.
pub fn extract_price(text: &str) -> Option<f64> {
    let re = Regex::new(
        r"\$\s*(\d+(?:\.\d{1,2})?)|(\d+(?:\.\d{1,2})?)\s*(?:/\s*mo(?:nth)?\b|dollars\b)",
    )
    .ok()?;
    let caps = re.captures(text)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?;
    digits.as_str().parse().ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// DuckDuckGo client
// ─────────────────────────────────────────────────────────────────────────────

/// DuckDuckGo instant answer API client (limited but free, no key needed).
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

const SEARCH_TIMEOUT_SECS: u64 = 15;

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::Search(format!("DuckDuckGo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AgentError::Search(format!(
                "DuckDuckGo returned {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Search(format!("Failed to parse response: {e}")))?;

        let mut hits = Vec::new();

        // The abstract, if any, is the best single answer.
        if let Some(abstract_text) = data["AbstractText"].as_str()
            && !abstract_text.is_empty()
        {
            hits.push(WebHit {
                title: data["Heading"].as_str().unwrap_or("Result").to_string(),
                url: data["AbstractURL"].as_str().unwrap_or("").to_string(),
                snippet: abstract_text.to_string(),
                price: extract_price(abstract_text),
            });
        }

        if let Some(topics) = data["RelatedTopics"].as_array() {
            for topic in topics.iter().take(max_results.saturating_sub(hits.len())) {
                if let (Some(text), Some(url)) =
                    (topic["Text"].as_str(), topic["FirstURL"].as_str())
                {
                    hits.push(WebHit {
                        title: text.chars().take(50).collect::<String>(),
                        url: url.to_string(),
                        snippet: text.to_string(),
                        price: extract_price(text),
                    });
                }
            }
        }

        Ok(hits)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

/// Mock search with scripted results and failures.
#[derive(Default)]
pub struct MockSearch {
    results: Mutex<Vec<WebHit>>,
    failures: Mutex<Vec<AgentError>>,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls return these hits (capped at the caller's `max_results`).
    pub fn with_hits(hits: Vec<WebHit>) -> Self {
        Self {
            results: Mutex::new(hits),
            ..Self::default()
        }
    }

    /// Queue a failure consumed before any success.
    pub fn push_failure(&self, error: AgentError) {
        self.failures.lock().unwrap().push(error);
    }

    /// Queries made so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>> {
        self.queries.lock().unwrap().push(query.to_string());

        if let Some(error) = self.failures.lock().unwrap().pop() {
            return Err(error);
        }

        let mut hits = self.results.lock().unwrap().clone();
        hits.truncate(max_results);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
