//! Reminder scheduling and delivery-state operations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use epistle_types::{Channel, Reminder, ReminderStatus};

use crate::error::{Result, StoreError};

use super::RecordStore;
use super::dedup_ops::parse_timestamp;

/// Columns selected by every reminder query, in [`row_to_reminder`] order.
const REMINDER_COLUMNS: &str = "id, record_id, vendor, amount, due_date, remind_at, \
     days_before, status, channel, recipient, created_at, sent_at, error";

impl RecordStore {
    /// Insert a reminder row on an open connection (used inside transactions).
    ///
    /// Uses INSERT OR IGNORE so re-scheduling the same record and offset is
    /// a no-op, keyed by the unique (record_id, days_before) index.
    pub(crate) fn insert_reminder_conn(conn: &Connection, reminder: &Reminder) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO reminders (
                id, record_id, vendor, amount, due_date, remind_at,
                days_before, status, channel, recipient, created_at, sent_at, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                reminder.id,
                reminder.record_id,
                reminder.vendor,
                reminder.amount,
                reminder.due_date.to_string(),
                reminder.remind_at.to_rfc3339(),
                reminder.days_before,
                reminder.status.as_str(),
                reminder.channel.as_str(),
                reminder.recipient,
                reminder.created_at.to_rfc3339(),
                reminder.sent_at.map(|t| t.to_rfc3339()),
                reminder.error,
            ],
        )?;
        Ok(())
    }

    /// Insert a reminder.
    pub fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_reminder_conn(&conn, reminder)?;
        debug!("Inserted reminder {} for record {}", reminder.id, reminder.record_id);
        Ok(())
    }

    /// Get a reminder by id.
    pub fn get_reminder(&self, id: &str) -> Result<Option<Reminder>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_reminder(row)?))
        } else {
            Ok(None)
        }
    }

    /// Pending reminders whose fire time has passed, soonest first.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending' AND remind_at <= ?1
             ORDER BY remind_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![now.to_rfc3339()])?;

        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(row_to_reminder(row)?);
        }
        Ok(reminders)
    }

    /// All pending reminders, soonest first.
    pub fn pending_reminders(&self) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending'
             ORDER BY remind_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(row_to_reminder(row)?);
        }
        Ok(reminders)
    }

    /// Reminders scheduled for a record, regardless of status.
    pub fn reminders_for_record(&self, record_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE record_id = ?1
             ORDER BY remind_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![record_id])?;

        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(row_to_reminder(row)?);
        }
        Ok(reminders)
    }

    /// Mark a reminder as delivered.
    pub fn mark_reminder_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let rows = conn.execute(
            "UPDATE reminders SET status = 'sent', sent_at = ?2, error = NULL WHERE id = ?1",
            params![id, sent_at.to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("reminder {id}")));
        }
        Ok(())
    }

    /// Mark a reminder as failed, recording the delivery error.
    pub fn mark_reminder_failed(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let rows = conn.execute(
            "UPDATE reminders SET status = 'failed', error = ?2 WHERE id = ?1",
            params![id, error],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("reminder {id}")));
        }
        Ok(())
    }

    /// Delete a reminder. Returns true if a row was removed.
    pub fn delete_reminder(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Pending reminders firing within the next `hours`, soonest first.
    pub fn upcoming_reminders(&self, now: DateTime<Utc>, hours: i64) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let horizon = now + chrono::Duration::hours(hours);

        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending' AND remind_at > ?1 AND remind_at <= ?2
             ORDER BY remind_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![now.to_rfc3339(), horizon.to_rfc3339()])?;

        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(row_to_reminder(row)?);
        }
        Ok(reminders)
    }

    /// Reminder counts per delivery status.
    pub fn reminder_status_counts(&self) -> Result<ReminderStats> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM reminders GROUP BY status")?;
        let mut rows = stmt.query([])?;

        let mut stats = ReminderStats::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: usize = row.get(1)?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "sent" => stats.sent = count,
                "failed" => stats.failed = count,
                other => {
                    return Err(StoreError::InvalidData(format!(
                        "unknown reminder status '{other}'"
                    )));
                }
            }
        }
        Ok(stats)
    }

    /// Remove sent and failed reminders whose fire time is older than `cutoff`.
    ///
    /// Pending rows are never pruned. Returns the number of rows removed.
    pub fn prune_reminders(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM reminders
             WHERE status IN ('sent', 'failed') AND remind_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        debug!("Pruned {rows} delivered reminders older than {cutoff}");
        Ok(rows)
    }
}

/// Reminder counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReminderStats {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Map a row in [`REMINDER_COLUMNS`] order back onto a [`Reminder`].
fn row_to_reminder(row: &Row) -> Result<Reminder> {
    let due_date_str: String = row.get(4)?;
    let due_date = due_date_str
        .parse()
        .map_err(|_| StoreError::InvalidData(format!("invalid due date '{due_date_str}'")))?;

    let remind_at_str: String = row.get(5)?;
    let created_at_str: String = row.get(10)?;

    let status_str: String = row.get(7)?;
    let status = ReminderStatus::parse(&status_str).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown reminder status '{status_str}'"))
    })?;

    let channel_str: String = row.get(8)?;
    let channel = Channel::parse(&channel_str)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown channel '{channel_str}'")))?;

    let sent_at = match row.get::<_, Option<String>>(11)? {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(Reminder {
        id: row.get(0)?,
        record_id: row.get(1)?,
        vendor: row.get(2)?,
        amount: row.get(3)?,
        due_date,
        remind_at: parse_timestamp(&remind_at_str)?,
        days_before: row.get(6)?,
        status,
        channel,
        recipient: row.get(9)?,
        created_at: parse_timestamp(&created_at_str)?,
        sent_at,
        error: row.get(12)?,
    })
}
