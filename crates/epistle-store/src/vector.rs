//! Embedding storage and nearest-neighbour lookup on sqlite-vec.
//!
//! One vector per structured record, keyed by record id in a vec0 virtual
//! table. The functions here operate on a raw connection; [`RecordStore`]
//! wraps them behind its lock and joins results back to records.
//!
//! [`RecordStore`]: crate::store::RecordStore

use rusqlite::{Connection, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::Result;

/// Register sqlite-vec as an auto extension.
///
/// Must run before any connection that touches embeddings is opened.
/// `sqlite3_auto_extension` is process-global and idempotent, so calling
/// this more than once is harmless.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// The loaded sqlite-vec version string, for diagnostics.
pub fn vec_version(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

/// Create the vec0 table for record embeddings if it does not exist.
pub fn ensure_embedding_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS record_embeddings USING vec0(
            record_id TEXT PRIMARY KEY,
            embedding float[{dims}]
        )
        "#
    );

    conn.execute_batch(&sql)?;

    info!(dims, "record_embeddings table ready");
    Ok(())
}

/// Drop the embeddings table. Reindexing recreates it when the embedder's
/// dimensions change.
pub fn drop_embedding_table(conn: &Connection) -> Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS record_embeddings")?;
    info!("Dropped record_embeddings table");
    Ok(())
}

/// Write the embedding for a record, replacing any previous one.
pub fn upsert_embedding(conn: &Connection, record_id: &str, embedding: &[f32]) -> Result<()> {
    // vec0 has no ON CONFLICT support; delete first.
    conn.execute(
        "DELETE FROM record_embeddings WHERE record_id = ?1",
        params![record_id],
    )?;

    conn.execute(
        "INSERT INTO record_embeddings (record_id, embedding) VALUES (?1, ?2)",
        params![record_id, embedding.as_bytes()],
    )?;

    debug!(record_id, "Stored embedding");
    Ok(())
}

/// Remove a record's embedding. Returns whether one existed.
pub fn remove_embedding(conn: &Connection, record_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM record_embeddings WHERE record_id = ?1",
        params![record_id],
    )?;

    Ok(rows > 0)
}

/// One match from a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub record_id: String,
    /// Distance to the query vector; smaller is closer.
    pub distance: f32,
}

/// The k nearest stored embeddings to `query`, closest first.
pub fn nearest(conn: &Connection, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT record_id, distance
        FROM record_embeddings
        WHERE embedding MATCH ?1
        ORDER BY distance
        LIMIT ?2
        "#,
    )?;

    let mut rows = stmt.query(params![query.as_bytes(), k as i64])?;

    let mut neighbors = Vec::new();
    while let Some(row) = rows.next()? {
        neighbors.push(Neighbor {
            record_id: row.get(0)?,
            distance: row.get(1)?,
        });
    }

    debug!(found = neighbors.len(), k, "Nearest-neighbour query");
    Ok(neighbors)
}

/// Number of stored embeddings.
pub fn embedding_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM record_embeddings", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Whether a record has an embedding.
pub fn embedding_exists(conn: &Connection, record_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM record_embeddings WHERE record_id = ?1)",
        params![record_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_conn(dims: usize) -> Connection {
        init_vector_extension();
        let conn = Connection::open_in_memory().unwrap();
        ensure_embedding_table(&conn, dims).unwrap();
        conn
    }

    #[test]
    fn test_extension_registers() {
        init_vector_extension();
        let conn = Connection::open_in_memory().unwrap();
        assert!(!vec_version(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_table_is_empty() {
        let conn = vec_conn(4);
        assert_eq!(embedding_count(&conn).unwrap(), 0);
        assert!(!embedding_exists(&conn, "missing").unwrap());
    }

    #[test]
    fn test_upsert_and_exists() {
        let conn = vec_conn(4);

        upsert_embedding(&conn, "bill-1", &[0.5f32, 0.5, 0.0, 0.0]).unwrap();

        assert!(embedding_exists(&conn, "bill-1").unwrap());
        assert!(!embedding_exists(&conn, "bill-2").unwrap());
        assert_eq!(embedding_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_remove_embedding_reports_presence() {
        let conn = vec_conn(4);

        upsert_embedding(&conn, "bill-1", &[0.5f32, 0.5, 0.0, 0.0]).unwrap();

        assert!(remove_embedding(&conn, "bill-1").unwrap());
        assert!(!embedding_exists(&conn, "bill-1").unwrap());
        assert!(!remove_embedding(&conn, "bill-1").unwrap());
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let conn = vec_conn(4);

        upsert_embedding(&conn, "same", &[1.0f32, 0.0, 0.0, 0.0]).unwrap();
        upsert_embedding(&conn, "near", &[0.8f32, 0.2, 0.0, 0.0]).unwrap();
        upsert_embedding(&conn, "orthogonal", &[0.0f32, 0.0, 0.0, 1.0]).unwrap();

        let neighbors = nearest(&conn, &[1.0f32, 0.0, 0.0, 0.0], 10).unwrap();

        assert_eq!(neighbors.len(), 3);
        assert_eq!(neighbors[0].record_id, "same");
        assert!(neighbors[0].distance < 0.01);
        assert_eq!(neighbors[1].record_id, "near");
        assert_eq!(neighbors[2].record_id, "orthogonal");
    }

    #[test]
    fn test_nearest_honors_k() {
        let conn = vec_conn(4);

        for i in 0..5 {
            upsert_embedding(&conn, &format!("rec-{i}"), &[i as f32, 0.0, 0.0, 0.0]).unwrap();
        }

        let neighbors = nearest(&conn, &[2.5f32, 0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(neighbors.len(), 2);
    }

    #[test]
    fn test_upsert_replaces_existing_vector() {
        let conn = vec_conn(4);

        upsert_embedding(&conn, "rec", &[1.0f32, 0.0, 0.0, 0.0]).unwrap();
        upsert_embedding(&conn, "rec", &[0.0f32, 1.0, 0.0, 0.0]).unwrap();

        assert_eq!(embedding_count(&conn).unwrap(), 1);

        let neighbors = nearest(&conn, &[0.0f32, 1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(neighbors[0].record_id, "rec");
        assert!(neighbors[0].distance < 0.01);
    }
}
