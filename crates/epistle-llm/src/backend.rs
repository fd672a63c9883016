//! Chat-completion backend trait, retry loop, and test double.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Run an async operation, retrying transient failures with exponential
/// backoff.
///
/// Only network errors and rate limits are retried; anything else returns
/// immediately. A provider wait hint (Retry-After) stretches the backoff
/// when it is longer than the computed one. `max_retries` counts the extra
/// attempts after the first, so the operation runs at most
/// `max_retries + 1` times.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;

    for attempt in 1..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() => {
                if let Some(hint) = e.retry_after() {
                    backoff = backoff.max(hint);
                }
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    // Last attempt; its result stands either way.
    f().await
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A chat-completion provider.
///
/// The agent depends only on this trait, so routing, extraction, and
/// analysis can run against [`MockBackend`] in tests and degrade to
/// rule-based behavior when no provider is configured.
#[async_trait]
pub trait LlmBackend: Send + Sync + std::fmt::Debug {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Provider name for logs and status output.
    fn name(&self) -> &str;

    /// Verify the provider is reachable and the credentials work.
    async fn health_check(&self) -> Result<()>;
}

/// A backend shared across async tasks.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<CompletionResponse>,
    requests: Vec<CompletionRequest>,
}

/// Scripted backend for tests.
///
/// Hands out the configured responses in order and records every request
/// it receives, so tests can assert on both sides of the exchange.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Script a sequence of responses. Requests beyond the script fail.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            state: Mutex::new(MockState {
                responses,
                requests: Vec::new(),
            }),
        }
    }

    /// Script a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::new(
            "mock_msg_1",
            "mock-model",
            text,
            Usage::new(10, 20),
        )])
    }

    /// Script a sequence of text responses.
    pub fn with_texts(texts: Vec<String>) -> Self {
        let responses = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                CompletionResponse::new(
                    format!("mock_msg_{}", i + 1),
                    "mock-model",
                    text,
                    Usage::new(10, 20),
                )
            })
            .collect();
        Self::new(responses)
    }

    /// Every request made so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request);

        if state.responses.is_empty() {
            return Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        Ok(state.responses.remove(0))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
