//! Record, dedup and reminder storage for Epistle.
//!
//! This crate provides persistent storage for the structured records the
//! ingestion pipeline produces, the dedup ledger that keeps re-scanned mail
//! from being ingested twice, and the payment reminder schedule. It uses
//! SQLite for durability and **sqlite-vec** for semantic search over record
//! embeddings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RecordStore                                                            │
//! │  - Single SQLite file with WAL mode                                     │
//! │  - records, seen_sources, reminders, meta tables                        │
//! │  - record_embeddings vec0 table for similarity search                   │
//! │  - commit_record(): ledger + record + embedding + reminders in one tx   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use epistle_store::{RecordFilter, RecordStore};
//! use epistle_types::RecordType;
//!
//! // Open or create a record store
//! let store = RecordStore::open("~/.epistle/records.db")?;
//!
//! // List stored bills, newest first
//! let bills = store.list_records(
//!     &RecordFilter::default().with_record_type(RecordType::Bill),
//! )?;
//!
//! // Substring search over subject, sender, vendor and summary
//! let hits = store.search_records("electricity", 10)?;
//!
//! let stats = store.stats()?;
//! # Ok::<(), epistle_store::StoreError>(())
//! ```

pub mod error;
pub mod store;
pub mod vector;

// Re-export error types
pub use error::{Result, StoreError};

// Re-export store
pub use store::{
    CommitOutcome, RecordFilter, RecordStore, ReindexDryRun, ReindexReport, ReminderStats,
    ScanSummary, SpendingReport, SpendingRow, StoreStats,
};

// Re-export vector search
pub use vector::{Neighbor, init_vector_extension};
