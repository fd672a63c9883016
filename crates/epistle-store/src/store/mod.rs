//! Record store implementation using SQLite.
//!
//! Provides persistent storage for structured records, the dedup ledger and
//! payment reminders using rusqlite. Integrates sqlite-vec for semantic
//! search over record embeddings.
//!
//! The write path that matters is [`RecordStore::commit_record`]: the dedup
//! entry, the record row, the embedding and the reminder schedule go in as a
//! single transaction, so one source item can never produce two records even
//! when scans run concurrently.

mod commit_ops;
mod dedup_ops;
pub mod query;
mod record_ops;
mod reminder_ops;
mod vector_ops;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::Result;

pub use commit_ops::CommitOutcome;
pub use query::{
    RecordFilter, ReindexDryRun, ReindexReport, ScanSummary, SpendingReport, SpendingRow,
    StoreStats,
};
pub use reminder_ops::ReminderStats;

/// Schema version, tracked in SQLite's `user_version` pragma.
const SCHEMA_VERSION: i32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Record Store
// ─────────────────────────────────────────────────────────────────────────────

/// Record store backed by a single SQLite file.
///
/// Vector search is opt-in: call [`RecordStore::init_vectors`] after opening
/// to enable it. Without that, semantic search methods return empty results
/// and keyword search still works.
pub struct RecordStore {
    /// rusqlite connections are not Sync, so all access goes through a mutex.
    pub(crate) conn: Mutex<Connection>,
    /// Set once init_vectors has run.
    pub(crate) vectors_initialized: Mutex<bool>,
    /// Set when stored embedding dimensions disagree with the configured
    /// embedder. Cleared by reindexing.
    pub(crate) vectors_stale: Mutex<bool>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("vectors_initialized", &self.vectors_initialized)
            .field("vectors_stale", &self.vectors_stale)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Open or create the store at `path`, creating parent directories and
    /// migrating the schema as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            vectors_initialized: Mutex::new(false),
            vectors_stale: Mutex::new(false),
        };
        store.initialize()?;

        info!("Record store opened at {:?}", path);
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            vectors_initialized: Mutex::new(false),
            vectors_stale: Mutex::new(false),
        };
        store.initialize()?;

        debug!("Opened in-memory record store");
        Ok(store)
    }

    /// Whether [`RecordStore::init_vectors`] has run on this store.
    pub fn has_vectors(&self) -> bool {
        *self.vectors_initialized.lock().unwrap()
    }

    /// Apply pragmas and bring the schema up to date.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // WAL keeps status/ask reads from blocking on a scan in progress
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        self.create_schema(&conn)?;

        Ok(())
    }

    /// Create or migrate the schema.
    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrating record store schema"
        );

        conn.execute_batch(
            r#"
            -- Records table: one row per ingested source item
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                source_id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                date TEXT NOT NULL,
                body_preview TEXT NOT NULL,
                summary TEXT NOT NULL,
                amount REAL,
                vendor TEXT,
                due_date TEXT,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                extraction_failed INTEGER NOT NULL DEFAULT 0
            );

            -- Category listings
            CREATE INDEX IF NOT EXISTS idx_records_record_type
                ON records(record_type);

            -- Spending analysis filters on date windows
            CREATE INDEX IF NOT EXISTS idx_records_date
                ON records(date);

            -- Dedup ledger: one row per ingested source id
            CREATE TABLE IF NOT EXISTS seen_sources (
                source_id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            );

            -- Schema metadata
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        if current_version < 2 {
            self.migrate_v2(conn)?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema ready (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Migration v2: Add the reminders table.
    fn migrate_v2(&self, conn: &Connection) -> Result<()> {
        info!("Running migration v2: adding reminders table");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                vendor TEXT NOT NULL,
                amount REAL,
                due_date TEXT NOT NULL,
                remind_at TEXT NOT NULL,
                days_before INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                channel TEXT NOT NULL,
                recipient TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                sent_at TEXT,
                error TEXT
            );

            -- Due-reminder polling
            CREATE INDEX IF NOT EXISTS idx_reminders_status_remind_at
                ON reminders(status, remind_at);

            -- One reminder per record and offset
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reminders_record_offset
                ON reminders(record_id, days_before);
            "#,
        )?;

        info!("Migration v2 complete");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Run `f` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            // Dropping the transaction rolls it back
            Err(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Operations
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Read a key from the meta table.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a key to the meta table, replacing any previous value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;

        Ok(())
    }

    /// Persist the outcome of an ingestion run.
    pub fn set_last_scan(&self, summary: &ScanSummary) -> Result<()> {
        let json = serde_json::to_string(summary)?;
        self.set_meta("scan.last", &json)
    }

    /// The outcome of the most recent ingestion run, if any.
    pub fn last_scan(&self) -> Result<Option<ScanSummary>> {
        match self.get_meta("scan.last")? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Counts and embedding metadata, as shown by status output.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        let seen_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM seen_sources", [], |row| row.get(0))?;
        let reminder_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))?;
        let pending_reminder_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reminders WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let mut records_by_type = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT record_type, COUNT(*) FROM records
                 GROUP BY record_type ORDER BY COUNT(*) DESC, record_type",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let record_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                records_by_type.push((record_type, count as usize));
            }
        }

        // The vec0 table only exists once init_vectors has run
        let embedding_count: usize = crate::vector::embedding_count(&conn).unwrap_or(0);

        let embedding_provider: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding.provider'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let embedding_dimensions: Option<usize> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding.dimensions'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|s| s.parse().ok());

        Ok(StoreStats {
            record_count: record_count as usize,
            records_by_type,
            seen_count: seen_count as usize,
            reminder_count: reminder_count as usize,
            pending_reminder_count: pending_reminder_count as usize,
            embedding_count,
            schema_version: SCHEMA_VERSION,
            embedding_provider,
            embedding_dimensions,
            vectors_stale: *self.vectors_stale.lock().unwrap(),
        })
    }
}
