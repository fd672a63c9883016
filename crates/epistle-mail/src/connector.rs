//! Mailbox connector trait and mock implementation.
//!
//! The connector is the boundary between the agent and whatever actually
//! holds the mail. The agent never touches provider APIs directly; it asks
//! a connector for messages in a time window and for attachment bytes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use epistle_types::{SourceItem, TimeWindow};

use crate::error::{ConnectorError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Connector Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for mailbox access.
///
/// Implementations must be cheap to call repeatedly: `list_messages` is
/// invoked on every scan, including scans that turn out to be no-ops
/// because everything was already ingested.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// List messages, optionally restricted to a time window and filtered
    /// by a free-text hint (matched against sender, subject, and body).
    async fn list_messages(
        &self,
        window: Option<&TimeWindow>,
        hint: Option<&str>,
    ) -> Result<Vec<SourceItem>>;

    /// Fetch the raw bytes of an attachment.
    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;

    /// Get the name of this connector.
    fn name(&self) -> &str;
}

/// A connector that can be shared across threads.
pub type SharedConnector = Arc<dyn MailConnector>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Connector
// ─────────────────────────────────────────────────────────────────────────────

/// A mock connector for testing purposes.
///
/// Serves a fixed set of items and supports scripted transient failures so
/// retry behavior can be exercised deterministically.
#[derive(Debug, Default)]
pub struct MockConnector {
    items: Vec<SourceItem>,
    attachments: HashMap<(String, String), Vec<u8>>,
    failures: Mutex<Vec<ConnectorError>>,
    list_calls: Mutex<usize>,
}

impl MockConnector {
    /// Create an empty mock connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock connector serving the given items.
    pub fn with_items(items: Vec<SourceItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Register attachment bytes for a (message, attachment) pair.
    pub fn add_attachment(
        mut self,
        message_id: impl Into<String>,
        attachment_id: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.attachments
            .insert((message_id.into(), attachment_id.into()), bytes);
        self
    }

    /// Queue an error to be returned by the next `list_messages` call.
    ///
    /// Queued errors are consumed in order before any items are served.
    pub fn push_failure(&self, error: ConnectorError) {
        self.failures.lock().unwrap().push(error);
    }

    /// Number of `list_messages` calls made so far.
    pub fn list_call_count(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl MailConnector for MockConnector {
    async fn list_messages(
        &self,
        window: Option<&TimeWindow>,
        hint: Option<&str>,
    ) -> Result<Vec<SourceItem>> {
        *self.list_calls.lock().unwrap() += 1;

        {
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        Ok(filter_items(&self.items, window, hint))
    }

    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        self.attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "attachment {} on message {}",
                    attachment_id, message_id
                ))
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Apply window and hint filters to a message list.
pub(crate) fn filter_items(
    items: &[SourceItem],
    window: Option<&TimeWindow>,
    hint: Option<&str>,
) -> Vec<SourceItem> {
    items
        .iter()
        .filter(|item| window.is_none_or(|w| w.contains(item.timestamp)))
        .filter(|item| {
            hint.is_none_or(|h| {
                let needle = h.to_lowercase();
                item.subject.to_lowercase().contains(&needle)
                    || item.sender.to_lowercase().contains(&needle)
                    || item.body.to_lowercase().contains(&needle)
            })
        })
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn item(id: &str, subject: &str, days_ago: i64) -> SourceItem {
        SourceItem::new(
            id,
            "billing@example.com",
            subject,
            Utc::now() - Duration::days(days_ago),
            "body text",
        )
    }

    #[tokio::test]
    async fn test_mock_lists_all_items() {
        let connector =
            MockConnector::with_items(vec![item("m1", "Invoice", 1), item("m2", "Receipt", 2)]);

        let items = connector.list_messages(None, None).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(connector.list_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_window_filter() {
        let connector =
            MockConnector::with_items(vec![item("m1", "Recent", 1), item("m2", "Old", 40)]);

        let window = TimeWindow::last_days(7);
        let items = connector
            .list_messages(Some(&window), None)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "m1");
    }

    #[tokio::test]
    async fn test_mock_hint_filter() {
        let connector = MockConnector::with_items(vec![
            item("m1", "Electric bill due", 1),
            item("m2", "Team lunch", 1),
        ]);

        let items = connector.list_messages(None, Some("BILL")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "m1");
    }

    #[tokio::test]
    async fn test_mock_scripted_failure_then_success() {
        let connector = MockConnector::with_items(vec![item("m1", "Invoice", 1)]);
        connector.push_failure(ConnectorError::Connection("reset".to_string()));

        let first = connector.list_messages(None, None).await;
        assert!(matches!(first, Err(ConnectorError::Connection(_))));

        let second = connector.list_messages(None, None).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_fetch_attachment() {
        let connector = MockConnector::with_items(vec![])
            .add_attachment("m1", "a1", b"pdf bytes".to_vec());

        let bytes = connector.fetch_attachment("m1", "a1").await.unwrap();
        assert_eq!(bytes, b"pdf bytes");

        let missing = connector.fetch_attachment("m1", "nope").await;
        assert!(matches!(missing, Err(ConnectorError::NotFound(_))));
    }
}
