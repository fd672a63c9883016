//! Payment reminders and notification channels.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::StructuredRecord;

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Telegram,
    Whatsapp,
    /// Prints instead of delivering; the default when nothing is configured.
    Console,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Telegram => "telegram",
            Channel::Whatsapp => "whatsapp",
            Channel::Console => "console",
        }
    }

    pub fn parse(s: &str) -> Option<Channel> {
        match s.trim().to_lowercase().as_str() {
            "email" => Some(Channel::Email),
            "telegram" => Some(Channel::Telegram),
            "whatsapp" => Some(Channel::Whatsapp),
            "console" => Some(Channel::Console),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ReminderStatus> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "sent" => Some(ReminderStatus::Sent),
            "failed" => Some(ReminderStatus::Failed),
            _ => None,
        }
    }
}

/// A scheduled payment reminder for a stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    /// The [`StructuredRecord`] this reminder was created for.
    pub record_id: String,
    pub vendor: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub amount: Option<f64>,
    pub due_date: NaiveDate,
    /// When to deliver; `days_before` days ahead of the due date.
    pub remind_at: DateTime<Utc>,
    pub days_before: i64,
    pub status: ReminderStatus,
    pub channel: Channel,
    pub recipient: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Reminder {
    /// Build the reminder schedule for a record with a due date: one pending
    /// reminder per `days_before` offset. Records without a due date produce
    /// an empty schedule.
    pub fn schedule(
        record: &StructuredRecord,
        days_before: &[i64],
        channel: Channel,
        recipient: impl Into<String>,
    ) -> Vec<Reminder> {
        let Some(due_date) = record.due_date else {
            return Vec::new();
        };
        let recipient = recipient.into();
        let now = Utc::now();

        days_before
            .iter()
            .map(|&days| {
                let remind_on = due_date - Duration::days(days);
                Reminder {
                    id: Uuid::new_v4().to_string(),
                    record_id: record.id.clone(),
                    vendor: record
                        .vendor
                        .clone()
                        .unwrap_or_else(|| record.sender.clone()),
                    amount: record.amount,
                    due_date,
                    remind_at: remind_on
                        .and_hms_opt(9, 0, 0)
                        .unwrap_or_default()
                        .and_utc(),
                    days_before: days,
                    status: ReminderStatus::Pending,
                    channel,
                    recipient: recipient.clone(),
                    created_at: now,
                    sent_at: None,
                    error: None,
                }
            })
            .collect()
    }

    /// The notification body for this reminder.
    pub fn message(&self) -> String {
        match self.amount {
            Some(amount) => format!(
                "Payment reminder: ${:.2} to {} due {} ({} day(s) from now)",
                amount, self.vendor, self.due_date, self.days_before
            ),
            None => format!(
                "Payment reminder: payment to {} due {} ({} day(s) from now)",
                self.vendor, self.due_date, self.days_before
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    fn bill_record(due: Option<NaiveDate>) -> StructuredRecord {
        StructuredRecord {
            id: "rec-1".into(),
            record_type: RecordType::Bill,
            source_id: "msg-1".into(),
            sender: "billing@acme.com".into(),
            subject: "Invoice".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            body_preview: "".into(),
            summary: "Acme invoice".into(),
            amount: Some(120.5),
            vendor: Some("Acme".into()),
            due_date: due,
            has_attachments: false,
            extraction_failed: false,
        }
    }

    #[test]
    fn test_schedule_default_offsets() {
        let due = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let reminders = Reminder::schedule(
            &bill_record(Some(due)),
            &[3, 1],
            Channel::Console,
            "me@example.com",
        );

        assert_eq!(reminders.len(), 2);
        assert_eq!(
            reminders[0].remind_at.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()
        );
        assert_eq!(
            reminders[1].remind_at.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
        );
        assert!(reminders.iter().all(|r| r.status == ReminderStatus::Pending));
        assert_eq!(reminders[0].vendor, "Acme");
    }

    #[test]
    fn test_schedule_without_due_date_is_empty() {
        let reminders = Reminder::schedule(&bill_record(None), &[3, 1], Channel::Console, "me");
        assert!(reminders.is_empty());
    }

    #[test]
    fn test_schedule_falls_back_to_sender_for_vendor() {
        let due = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let mut record = bill_record(Some(due));
        record.vendor = None;
        let reminders = Reminder::schedule(&record, &[1], Channel::Email, "me");
        assert_eq!(reminders[0].vendor, "billing@acme.com");
    }

    #[test]
    fn test_message_includes_amount_when_known() {
        let due = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let reminders = Reminder::schedule(&bill_record(Some(due)), &[3], Channel::Console, "me");
        let msg = reminders[0].message();
        assert!(msg.contains("Acme"));
        assert!(msg.contains("$120.50"));
        assert!(msg.contains("2025-03-15"));
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(Channel::parse("Telegram"), Some(Channel::Telegram));
        assert_eq!(Channel::parse("sms"), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ReminderStatus::Pending,
            ReminderStatus::Sent,
            ReminderStatus::Failed,
        ] {
            assert_eq!(ReminderStatus::parse(status.as_str()), Some(status));
        }
    }
}
