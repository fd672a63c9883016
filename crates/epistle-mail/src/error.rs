//! Error types for mailbox connectors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the connector error type.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors raised by mailbox connectors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Transient connectivity failure (retryable).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication or authorization failure.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A referenced message or attachment does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The fixture mailbox file could not be read.
    #[error("failed to read mailbox '{path}': {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mailbox contents could not be parsed.
    #[error("Malformed mailbox: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Returns true if this error is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_retryable() {
        assert!(ConnectorError::Connection("reset".to_string()).is_retryable());
        assert!(!ConnectorError::Auth("expired token".to_string()).is_retryable());
        assert!(!ConnectorError::NotFound("msg-1".to_string()).is_retryable());
    }
}
