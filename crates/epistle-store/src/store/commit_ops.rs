//! Atomic ingestion commits spanning records, the dedup ledger, vectors and
//! reminders.

use chrono::Utc;
use rusqlite::params;
use tracing::debug;

use epistle_types::{Reminder, StructuredRecord};

use crate::error::Result;

use super::RecordStore;

/// Outcome of a [`RecordStore::commit_record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The record was stored.
    Committed,
    /// The source was already in the ledger; nothing was written.
    Duplicate,
}

impl RecordStore {
    /// Atomically persist one ingested source item.
    ///
    /// Claims the source id in the dedup ledger, then writes the record row,
    /// the embedding (when given and vectors are usable) and the reminder
    /// schedule, all in a single transaction. If the source id is already
    /// claimed nothing is written and [`CommitOutcome::Duplicate`] comes
    /// back, so concurrent scans can race on the same item safely.
    pub fn commit_record(
        &self,
        record: &StructuredRecord,
        embedding: Option<&[f32]>,
        reminders: &[Reminder],
    ) -> Result<CommitOutcome> {
        let vectors_usable = self.has_vectors() && !self.vectors_stale();

        let outcome = self.with_transaction(|conn| {
            if !Self::mark_seen_conn(conn, &record.source_id, &record.id, Utc::now())? {
                return Ok(CommitOutcome::Duplicate);
            }

            Self::insert_record_conn(conn, record)?;

            if let Some(embedding) = embedding
                && vectors_usable
            {
                crate::vector::upsert_embedding(conn, &record.id, embedding)?;
            }

            for reminder in reminders {
                Self::insert_reminder_conn(conn, reminder)?;
            }

            Ok(CommitOutcome::Committed)
        })?;

        match outcome {
            CommitOutcome::Committed => {
                debug!(
                    "Committed record {} for source {}",
                    record.id, record.source_id
                );
            }
            CommitOutcome::Duplicate => {
                debug!("Source {} already ingested, skipping", record.source_id);
            }
        }

        Ok(outcome)
    }

    /// Remove every trace of a source item: its record, embedding, reminders
    /// and the ledger entry. Used by forced re-ingestion.
    ///
    /// Returns `false` when the source id was never ingested.
    pub fn remove_source(&self, source_id: &str) -> Result<bool> {
        let vectors_initialized = self.has_vectors();

        let removed = self.with_transaction(|conn| {
            let mut stmt =
                conn.prepare("SELECT record_id FROM seen_sources WHERE source_id = ?1")?;
            let mut rows = stmt.query(params![source_id])?;
            let Some(row) = rows.next()? else {
                return Ok(false);
            };
            let record_id: String = row.get(0)?;

            conn.execute(
                "DELETE FROM reminders WHERE record_id = ?1",
                params![record_id],
            )?;
            if vectors_initialized {
                crate::vector::remove_embedding(conn, &record_id)?;
            }
            conn.execute("DELETE FROM records WHERE id = ?1", params![record_id])?;
            conn.execute(
                "DELETE FROM seen_sources WHERE source_id = ?1",
                params![source_id],
            )?;
            Ok(true)
        })?;

        if removed {
            debug!("Removed source {} and its record", source_id);
        }
        Ok(removed)
    }
}
