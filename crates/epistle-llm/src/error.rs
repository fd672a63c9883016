//! Error taxonomy for chat and embedding calls.
//!
//! The split that matters operationally is retryable vs not: network hiccups
//! and rate limits get the backoff loop in [`with_retry`](crate::with_retry),
//! everything else surfaces immediately. Rate-limit errors carry the
//! provider's wait hint when one was given, so the retry loop can honor it
//! instead of guessing.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// A rate-limit rejection, with the provider's wait hint when available.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The provider's error message, verbatim.
    pub message: String,
    /// How long the provider asked us to wait, if it said.
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Build from a 429 response.
    ///
    /// All three supported providers speak the OpenAI wire shape but signal
    /// the wait differently: OpenAI sets a `Retry-After` header, Groq embeds
    /// "Please try again in 6.57s" in the message body, Ollama says nothing.
    /// The header wins when both are present.
    pub fn from_response(message: &str, retry_after_header: Option<&str>) -> Self {
        let retry_after = retry_after_header
            .and_then(retry_hint_from_header)
            .or_else(|| retry_hint_from_message(message));

        Self {
            message: message.to_string(),
            retry_after,
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// A `Retry-After` header value, integer-seconds form.
fn retry_hint_from_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Scan an error message for a "try again in 6.57s" style hint.
fn retry_hint_from_message(message: &str) -> Option<Duration> {
    const MARKERS: [&str; 3] = ["try again in ", "Try again in ", "retry in "];

    for marker in MARKERS {
        let Some(idx) = message.find(marker) else {
            continue;
        };
        let rest = &message[idx + marker.len()..];
        let digits: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(seconds) = digits.parse::<f64>() {
            return Duration::try_from_secs_f64(seconds).ok();
        }
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for chat-completion and embedding operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected or failed the request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connectivity or timeout failure. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend cannot be constructed as configured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The response body did not parse.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Too many requests or tokens. Retryable, honoring the wait hint.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// The API key was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A failure on our side of the call, e.g. client construction.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    pub fn rate_limit_with_retry(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimit(RateLimitInfo::with_retry_after(message, retry_after))
    }

    /// The provider's wait hint, for rate-limit errors that carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Whether the backoff loop should try this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
