//! Reminder notification channels for Epistle.
//!
//! Defines the [`Notifier`] trait the reminder scheduler delivers through,
//! with a console implementation for local use, a webhook implementation
//! that bridges to external channels (email, telegram, whatsapp relays),
//! and a mock for tests.
//!
//! Delivery failures are reported, never panicked on; the scheduler marks
//! the reminder as failed and moves on.

pub mod error;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use epistle_types::{Channel, Reminder};

pub use error::{NotifyError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Notifier Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A delivery channel for reminder notifications.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Deliver one reminder notification.
    async fn notify(&self, reminder: &Reminder) -> Result<()>;

    /// Channel name for logging and reminder bookkeeping.
    fn name(&self) -> &str;
}

/// Shared reference to a notifier.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Build a notifier for the configured channel.
///
/// The console channel needs nothing. Every other channel is delivered
/// through a webhook relay and requires `webhook_url`.
pub fn build_notifier(channel: Channel, webhook_url: Option<&str>) -> Result<SharedNotifier> {
    match channel {
        Channel::Console => Ok(Arc::new(ConsoleNotifier::new())),
        other => {
            let url = webhook_url.ok_or_else(|| {
                NotifyError::Config(format!(
                    "channel '{other}' requires reminders.webhook_url to be set"
                ))
            })?;
            Ok(Arc::new(WebhookNotifier::new(other, url)?))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Console Notifier
// ─────────────────────────────────────────────────────────────────────────────

/// Prints reminders to stdout. The default when nothing is configured.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, reminder: &Reminder) -> Result<()> {
        println!("🔔 {}", reminder.message());
        info!(reminder_id = %reminder.id, vendor = %reminder.vendor, "Reminder printed to console");
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook Notifier
// ─────────────────────────────────────────────────────────────────────────────

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Payload posted to the webhook relay.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    kind: &'static str,
    channel: &'a str,
    recipient: &'a str,
    message: String,
    reminder: &'a Reminder,
}

/// Delivers reminders as JSON POSTs to a relay endpoint.
///
/// The relay is responsible for the final hop (SMTP, bot API); this keeps
/// provider credentials out of the agent.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    channel: Channel,
    url: String,
}

impl WebhookNotifier {
    pub fn new(channel: Channel, url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            channel,
            url: url.into(),
        })
    }

    fn payload<'a>(&'a self, reminder: &'a Reminder) -> WebhookPayload<'a> {
        WebhookPayload {
            kind: "payment_reminder",
            channel: self.channel.as_str(),
            recipient: &reminder.recipient,
            message: reminder.message(),
            reminder,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, reminder: &Reminder) -> Result<()> {
        debug!(reminder_id = %reminder.id, url = %self.url, "Posting reminder to webhook");

        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(reminder))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!(
                "webhook returned {status}: {body}"
            )));
        }

        info!(reminder_id = %reminder.id, channel = %self.channel, "Reminder delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        self.channel.as_str()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Notifier
// ─────────────────────────────────────────────────────────────────────────────

/// Mock notifier for testing.
///
/// Records every delivered reminder; queued failures are consumed before
/// the success path, so delivery-error handling can be exercised.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Reminder>>,
    failures: Mutex<Vec<NotifyError>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next delivery attempt.
    pub fn push_failure(&self, error: NotifyError) {
        self.failures.lock().unwrap().push(error);
    }

    /// Reminders delivered so far.
    pub fn sent(&self) -> Vec<Reminder> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of reminders delivered so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, reminder: &Reminder) -> Result<()> {
        let failure = self.failures.lock().unwrap().pop();
        if let Some(error) = failure {
            return Err(error);
        }
        self.sent.lock().unwrap().push(reminder.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use epistle_types::ReminderStatus;

    fn reminder() -> Reminder {
        Reminder {
            id: "rem-1".to_string(),
            record_id: "rec-1".to_string(),
            vendor: "PowerCo".to_string(),
            amount: Some(142.75),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            remind_at: Utc::now(),
            days_before: 3,
            status: ReminderStatus::Pending,
            channel: Channel::Console,
            recipient: "me@example.com".to_string(),
            created_at: Utc::now(),
            sent_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_console_notifier_succeeds() {
        let notifier = ConsoleNotifier::new();
        notifier.notify(&reminder()).await.unwrap();
        assert_eq!(notifier.name(), "console");
    }

    #[tokio::test]
    async fn test_mock_records_deliveries() {
        let notifier = MockNotifier::new();
        notifier.notify(&reminder()).await.unwrap();
        notifier.notify(&reminder()).await.unwrap();

        assert_eq!(notifier.sent_count(), 2);
        assert_eq!(notifier.sent()[0].vendor, "PowerCo");
    }

    #[tokio::test]
    async fn test_mock_failure_queue_consumed_first() {
        let notifier = MockNotifier::new();
        notifier.push_failure(NotifyError::Delivery("relay down".into()));

        let err = notifier.notify(&reminder()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
        assert_eq!(notifier.sent_count(), 0);

        notifier.notify(&reminder()).await.unwrap();
        assert_eq!(notifier.sent_count(), 1);
    }

    #[test]
    fn test_build_notifier_console() {
        let notifier = build_notifier(Channel::Console, None).unwrap();
        assert_eq!(notifier.name(), "console");
    }

    #[test]
    fn test_build_notifier_requires_webhook_url() {
        let err = build_notifier(Channel::Email, None).unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
        assert!(err.to_string().contains("webhook_url"));
    }

    #[test]
    fn test_build_notifier_webhook_channel() {
        let notifier =
            build_notifier(Channel::Telegram, Some("https://relay.example/hook")).unwrap();
        assert_eq!(notifier.name(), "telegram");
    }

    #[test]
    fn test_webhook_payload_shape() {
        let notifier = WebhookNotifier::new(Channel::Email, "https://relay.example/hook").unwrap();
        let reminder = reminder();
        let json = serde_json::to_value(notifier.payload(&reminder)).unwrap();

        assert_eq!(json["kind"], "payment_reminder");
        assert_eq!(json["channel"], "email");
        assert_eq!(json["recipient"], "me@example.com");
        assert_eq!(json["reminder"]["vendor"], "PowerCo");
        assert_eq!(json["reminder"]["due_date"], "2025-03-15");
        assert!(json["message"].as_str().unwrap().contains("$142.75"));
    }
}
