//! Dedup ledger operations.
//!
//! Every committed record leaves one row in `seen_sources`. The ledger is
//! consulted before any extraction work so already-ingested mail is skipped
//! without spending model calls.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use epistle_types::DedupEntry;

use crate::error::{Result, StoreError};

use super::RecordStore;

impl RecordStore {
    /// Whether a source item has already been ingested.
    pub fn is_seen(&self, source_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM seen_sources WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// The ledger entry for a source item, if it was ingested.
    pub fn seen_entry(&self, source_id: &str) -> Result<Option<DedupEntry>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT source_id, record_id, ingested_at FROM seen_sources WHERE source_id = ?1",
        )?;
        let mut rows = stmt.query(params![source_id])?;

        if let Some(row) = rows.next()? {
            let ingested_at_str: String = row.get(2)?;
            let ingested_at = parse_timestamp(&ingested_at_str)?;
            Ok(Some(DedupEntry {
                source_id: row.get(0)?,
                record_id: row.get(1)?,
                ingested_at,
            }))
        } else {
            Ok(None)
        }
    }

    /// Number of source ids in the ledger.
    pub fn seen_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM seen_sources", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Claim a source id on an open connection.
    ///
    /// Returns `false` without writing when the id is already in the ledger.
    pub(crate) fn mark_seen_conn(
        conn: &Connection,
        source_id: &str,
        record_id: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = conn.execute(
            "INSERT OR IGNORE INTO seen_sources (source_id, record_id, ingested_at)
             VALUES (?1, ?2, ?3)",
            params![source_id, record_id, ingested_at.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidData(format!("invalid timestamp '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epistle_types::{RecordType, StructuredRecord};

    fn record(id: &str, source_id: &str) -> StructuredRecord {
        StructuredRecord {
            id: id.to_string(),
            record_type: RecordType::General,
            source_id: source_id.to_string(),
            sender: "someone@example.com".to_string(),
            subject: "Subject".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            body_preview: String::new(),
            summary: "Summary".to_string(),
            amount: None,
            vendor: None,
            due_date: None,
            has_attachments: false,
            extraction_failed: false,
        }
    }

    #[test]
    fn test_seen_after_commit() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(!store.is_seen("msg-1").unwrap());

        store
            .commit_record(&record("r1", "msg-1"), None, &[])
            .unwrap();

        assert!(store.is_seen("msg-1").unwrap());
        assert_eq!(store.seen_count().unwrap(), 1);
    }

    #[test]
    fn test_seen_entry_roundtrip() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .commit_record(&record("r1", "msg-1"), None, &[])
            .unwrap();

        let entry = store.seen_entry("msg-1").unwrap().unwrap();
        assert_eq!(entry.source_id, "msg-1");
        assert_eq!(entry.record_id, "r1");
        assert!((Utc::now() - entry.ingested_at).num_seconds() < 10);

        assert!(store.seen_entry("msg-2").unwrap().is_none());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("2025-03-01T09:00:00+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
