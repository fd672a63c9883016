//! Reminder dispatch.
//!
//! Walks due reminders out of the store and delivers them through the
//! configured [`Notifier`](epistle_notify::Notifier), marking each row sent
//! or failed. One pass is exposed as [`ReminderScheduler::check_now`] for
//! the CLI; long-lived sessions spawn the periodic loop.
//!
//! A delivery failure marks that reminder failed and moves on. It never
//! fails the pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use epistle_notify::{Notifier, SharedNotifier};
use epistle_store::RecordStore;

use crate::error::Result;

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderRunReport {
    /// Reminders that were due this pass.
    pub checked: usize,
    /// Delivered and marked sent.
    pub sent: usize,
    /// Delivery failed; marked failed with the error recorded.
    pub failed: usize,
}

impl fmt::Display for ReminderRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} due reminder(s): {} sent, {} failed",
            self.checked, self.sent, self.failed
        )
    }
}

/// Dispatches due reminders through a notification channel.
#[derive(Clone)]
pub struct ReminderScheduler {
    store: Arc<RecordStore>,
    notifier: SharedNotifier,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<RecordStore>,
        notifier: SharedNotifier,
        check_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            notifier,
            interval: Duration::from_secs(check_interval_secs),
        }
    }

    /// Run one pass: deliver everything currently due.
    pub async fn check_now(&self) -> Result<ReminderRunReport> {
        let due = self.store.due_reminders(Utc::now())?;
        let mut report = ReminderRunReport {
            checked: due.len(),
            ..Default::default()
        };

        for reminder in due {
            match self.notifier.notify(&reminder).await {
                Ok(()) => {
                    self.store.mark_reminder_sent(&reminder.id, Utc::now())?;
                    debug!(reminder_id = %reminder.id, vendor = %reminder.vendor, "Reminder sent");
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(
                        reminder_id = %reminder.id,
                        vendor = %reminder.vendor,
                        error = %e,
                        "Reminder delivery failed"
                    );
                    self.store.mark_reminder_failed(&reminder.id, &e.to_string())?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Spawn the periodic check loop.
    ///
    /// The first pass runs immediately, then one per configured interval.
    /// Abort the returned handle to stop it.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            loop {
                ticker.tick().await;
                match scheduler.check_now().await {
                    Ok(report) if report.checked > 0 => {
                        info!(sent = report.sent, failed = report.failed, "Reminder pass finished");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Reminder pass failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epistle_notify::{MockNotifier, NotifyError};
    use epistle_types::{Channel, RecordType, Reminder, ReminderStatus, StructuredRecord};

    fn bill_record(id: &str) -> StructuredRecord {
        let due = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        StructuredRecord {
            id: id.to_string(),
            record_type: RecordType::Bill,
            source_id: format!("src-{id}"),
            sender: "billing@powerco.example".to_string(),
            subject: "Your March bill".to_string(),
            date: due - chrono::Duration::days(14),
            body_preview: String::new(),
            summary: "PowerCo electricity bill".to_string(),
            amount: Some(142.75),
            vendor: Some("PowerCo".to_string()),
            due_date: Some(due),
            has_attachments: false,
            extraction_failed: false,
        }
    }

    fn seeded_store() -> (Arc<RecordStore>, StructuredRecord) {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let record = bill_record("msg-1");
        let reminders = Reminder::schedule(&record, &[3, 1], Channel::Console, "me@example.com");
        store.commit_record(&record, None, &reminders).unwrap();
        (store, record)
    }

    #[tokio::test]
    async fn test_check_now_delivers_due_reminders() {
        let (store, record) = seeded_store();
        let notifier = Arc::new(MockNotifier::new());
        let scheduler = ReminderScheduler::new(store.clone(), notifier.clone(), 300);

        // Both fire times (2025-03-12 and 2025-03-14) are long past.
        let report = scheduler.check_now().await.unwrap();
        assert_eq!(
            report,
            ReminderRunReport {
                checked: 2,
                sent: 2,
                failed: 0
            }
        );
        assert_eq!(notifier.sent_count(), 2);
        assert!(store.pending_reminders().unwrap().is_empty());

        let statuses: Vec<ReminderStatus> = store
            .reminders_for_record(&record.id)
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![ReminderStatus::Sent, ReminderStatus::Sent]);
    }

    #[tokio::test]
    async fn test_delivery_failure_marks_failed_and_continues() {
        let (store, record) = seeded_store();
        let notifier = Arc::new(MockNotifier::new());
        notifier.push_failure(NotifyError::Delivery("relay down".into()));
        let scheduler = ReminderScheduler::new(store.clone(), notifier.clone(), 300);

        let report = scheduler.check_now().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(notifier.sent_count(), 1);

        let failed: Vec<Reminder> = store
            .reminders_for_record(&record.id)
            .unwrap()
            .into_iter()
            .filter(|r| r.status == ReminderStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap().contains("relay down"));
    }

    #[tokio::test]
    async fn test_check_now_with_nothing_due() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let notifier = Arc::new(MockNotifier::new());
        let scheduler = ReminderScheduler::new(store, notifier.clone(), 300);

        let report = scheduler.check_now().await.unwrap();
        assert_eq!(report, ReminderRunReport::default());
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_loop_runs_first_pass() {
        let (store, _) = seeded_store();
        let notifier = Arc::new(MockNotifier::new());
        // Long interval: exactly one pass fires during the test.
        let scheduler = ReminderScheduler::new(store, notifier.clone(), 3600);

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(notifier.sent_count(), 2);
    }

    #[test]
    fn test_report_display() {
        let report = ReminderRunReport {
            checked: 3,
            sent: 2,
            failed: 1,
        };
        assert_eq!(
            report.to_string(),
            "checked 3 due reminder(s): 2 sent, 1 failed"
        );
    }
}
