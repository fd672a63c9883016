//! Agent error type, spanning every subsystem the agent drives.

use thiserror::Error;

/// Convenience alias for agent results.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Anything that can fail while routing, ingesting or answering.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM backend failure.
    #[error("LLM error: {0}")]
    Llm(#[from] epistle_llm::LlmError),

    /// Record store failure.
    #[error("Store error: {0}")]
    Store(#[from] epistle_store::StoreError),

    /// Mail connector failure.
    #[error("Mail error: {0}")]
    Mail(#[from] epistle_mail::ConnectorError),

    /// Attachment extraction failure.
    #[error("Extraction error: {0}")]
    Extract(#[from] epistle_extract::ExtractError),

    /// Notification delivery failure.
    #[error("Notify error: {0}")]
    Notify(#[from] epistle_notify::NotifyError),

    /// Web search failure.
    #[error("Search error: {0}")]
    Search(String),

    /// A per-item deadline elapsed.
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// The agent was assembled with an unusable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invariant violation inside the agent itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_display() {
        let err = AgentError::search("duckduckgo returned 503");
        assert!(err.to_string().contains("Search error"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_timeout_display() {
        let err = AgentError::Timeout(60);
        assert!(err.to_string().contains("60s"));
    }
}
