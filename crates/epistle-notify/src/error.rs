//! Error types for notification delivery.

use thiserror::Error;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notifier is misconfigured (missing webhook URL, bad channel).
    #[error("Notifier configuration error: {0}")]
    Config(String),

    /// Delivery was attempted and failed.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
