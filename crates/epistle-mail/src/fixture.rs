//! Fixture mailbox backed by a JSON file.
//!
//! Useful for demos and integration tests: the mailbox is a single JSON
//! document listing messages, with attachment content either inline or as
//! a path relative to the fixture file.
//!
//! ```json
//! {
//!   "messages": [
//!     {
//!       "id": "msg-001",
//!       "sender": "billing@powerco.example",
//!       "subject": "Your March statement",
//!       "timestamp": "2025-03-02T08:00:00Z",
//!       "body": "Amount due: $120.50 by March 15.",
//!       "attachments": [
//!         { "id": "att-1", "filename": "statement.pdf", "path": "statement.pdf" },
//!         { "id": "att-2", "filename": "note.txt", "text": "inline content" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use epistle_types::{AttachmentRef, SourceItem, TimeWindow};

use crate::connector::{MailConnector, filter_items};
use crate::error::{ConnectorError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Fixture file schema
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FixtureMailbox {
    messages: Vec<FixtureMessage>,
}

#[derive(Debug, Deserialize)]
struct FixtureMessage {
    id: String,
    sender: String,
    subject: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    attachments: Vec<FixtureAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureAttachment {
    id: String,
    filename: String,
    #[serde(default)]
    mime_type: Option<String>,
    /// Inline attachment content.
    #[serde(default)]
    text: Option<String>,
    /// Path to the content, relative to the fixture file.
    #[serde(default)]
    path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture Connector
// ─────────────────────────────────────────────────────────────────────────────

/// A read-only mailbox loaded from a JSON fixture file.
pub struct FixtureConnector {
    items: Vec<SourceItem>,
    attachments: Vec<(String, FixtureAttachment)>,
    base_dir: PathBuf,
}

impl FixtureConnector {
    /// Load a fixture mailbox from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConnectorError::Fixture {
            path: path.to_path_buf(),
            source,
        })?;
        let mailbox: FixtureMailbox = serde_json::from_str(&text)?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut items = Vec::with_capacity(mailbox.messages.len());
        let mut attachments = Vec::new();

        for message in mailbox.messages {
            let mut item = SourceItem::new(
                &message.id,
                message.sender,
                message.subject,
                message.timestamp,
                message.body,
            );

            for attachment in message.attachments {
                item.attachments.push(AttachmentRef {
                    id: attachment.id.clone(),
                    filename: attachment.filename.clone(),
                    mime_type: attachment.mime_type.clone(),
                });
                attachments.push((message.id.clone(), attachment));
            }

            items.push(item);
        }

        debug!(
            path = %path.display(),
            messages = items.len(),
            "loaded fixture mailbox"
        );

        Ok(Self {
            items,
            attachments,
            base_dir,
        })
    }

    /// Number of messages in the fixture.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the fixture holds no messages.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl MailConnector for FixtureConnector {
    async fn list_messages(
        &self,
        window: Option<&TimeWindow>,
        hint: Option<&str>,
    ) -> Result<Vec<SourceItem>> {
        Ok(filter_items(&self.items, window, hint))
    }

    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let attachment = self
            .attachments
            .iter()
            .find(|(mid, a)| mid == message_id && a.id == attachment_id)
            .map(|(_, a)| a)
            .ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "attachment {} on message {}",
                    attachment_id, message_id
                ))
            })?;

        if let Some(text) = &attachment.text {
            return Ok(text.clone().into_bytes());
        }

        if let Some(rel) = &attachment.path {
            let full = self.base_dir.join(rel);
            return tokio::fs::read(&full)
                .await
                .map_err(|source| ConnectorError::Fixture { path: full, source });
        }

        Err(ConnectorError::NotFound(format!(
            "attachment {} has no content",
            attachment_id
        )))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
