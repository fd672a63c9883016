//! Store error type and corruption detection.

use thiserror::Error;

/// Failures surfaced by record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON round-trip through a TEXT column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested record or reminder not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema upgrade could not complete.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored row could not be mapped back onto its domain type.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Filesystem error while creating the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error means the database file itself is unusable, as
    /// opposed to a bad query or a missing row.
    pub fn is_corruption(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_detection() {
        let corrupt = StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ));
        assert!(corrupt.is_corruption());

        let not_a_db = StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
            None,
        ));
        assert!(not_a_db.is_corruption());

        assert!(!StoreError::NotFound("rec-1".into()).is_corruption());
        assert!(!StoreError::Migration("bad".into()).is_corruption());
    }
}
