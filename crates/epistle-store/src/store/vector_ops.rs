//! Vector search and embedding operations on the record store.

use rusqlite::params;
use tracing::{debug, warn};

use epistle_types::StructuredRecord;

use crate::error::{Result, StoreError};

use super::{RecordFilter, RecordStore, ReindexDryRun, ReindexReport};

impl RecordStore {
    /// Initialize vector storage with dimension mismatch detection.
    ///
    /// Creates the embeddings table and stores the embedding dimensions and
    /// provider name in the metadata table. If previously stored dimensions
    /// differ from the requested dimensions, vectors are marked as stale and
    /// search returns empty results until a reindex is performed.
    pub fn init_vectors(&self, dims: usize, provider: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let stored_dims: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding.dimensions'",
                [],
                |row| row.get(0),
            )
            .ok();

        if let Some(ref stored) = stored_dims
            && let Ok(old_dims) = stored.parse::<usize>()
            && old_dims != dims
        {
            warn!(
                "Embedding dimension mismatch: stored={}, configured={}. \
                 Vector search disabled until reindex. Run `epistle reindex`.",
                old_dims, dims
            );
            *self.vectors_stale.lock().unwrap() = true;
            *self.vectors_initialized.lock().unwrap() = true;
            return Ok(());
        }

        crate::vector::ensure_embedding_table(&conn, dims)?;
        if let Ok(version) = crate::vector::vec_version(&conn) {
            debug!(version = %version, dims, provider, "Vector search enabled");
        }

        // Store metadata (fresh install or matching dims)
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.dimensions', ?1)",
            params![dims.to_string()],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.provider', ?1)",
            params![provider],
        )?;

        *self.vectors_initialized.lock().unwrap() = true;
        Ok(())
    }

    /// Check if stored embeddings are stale (dimension mismatch).
    pub fn vectors_stale(&self) -> bool {
        *self.vectors_stale.lock().unwrap()
    }

    /// Store an embedding for an existing record.
    pub fn store_embedding(&self, record_id: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        crate::vector::upsert_embedding(&conn, record_id, embedding)
    }

    /// Delete the embedding for a record.
    pub fn delete_embedding(&self, record_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        crate::vector::remove_embedding(&conn, record_id)
    }

    /// Search for similar records using vector similarity.
    ///
    /// Returns record ids ordered by distance (most similar first).
    pub fn search_similar(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<crate::vector::Neighbor>> {
        let conn = self.conn.lock().unwrap();
        crate::vector::nearest(&conn, query_embedding, limit)
    }

    /// Search for similar records and return the full records.
    pub fn search_similar_records(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(StructuredRecord, f32)>> {
        if self.vectors_stale() {
            debug!("Vector search skipped: embeddings are stale (dimension mismatch)");
            return Ok(Vec::new());
        }
        let results = self.search_similar(query_embedding, limit)?;

        let mut records = Vec::with_capacity(results.len());
        for result in results {
            if let Some(record) = self.get_record(&result.record_id)? {
                records.push((record, result.distance));
            }
        }

        Ok(records)
    }

    /// Check if a record has an embedding.
    pub fn has_embedding(&self, record_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        crate::vector::embedding_exists(&conn, record_id)
    }

    /// Get the count of stored embeddings.
    pub fn count_embeddings(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        crate::vector::embedding_count(&conn)
    }

    /// Dry-run reindex: returns counts without doing any work.
    pub fn reindex_dry_run(&self) -> Result<ReindexDryRun> {
        let conn = self.conn.lock().unwrap();
        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        let total_chars: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(subject) + LENGTH(summary) + LENGTH(body_preview)), 0)
             FROM records",
            [],
            |row| row.get(0),
        )?;
        Ok(ReindexDryRun {
            record_count: record_count as usize,
            estimated_tokens: (total_chars as usize) / 4,
        })
    }

    /// Reindex all record embeddings with a new embedder/dimensions.
    ///
    /// Drops the existing vector table, recreates it with the new dimensions,
    /// and re-embeds every record using the provided embed function.
    ///
    /// The `embed_batch` closure receives a batch of text strings and returns
    /// their embeddings. This avoids coupling the store to the LLM crate.
    pub async fn reindex<F, Fut>(
        &self,
        embed_batch: F,
        new_dims: usize,
        new_provider: &str,
    ) -> Result<ReindexReport>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Vec<Vec<f32>>, String>>,
    {
        let start = std::time::Instant::now();

        // 1. Read all records and their embedding text
        let records = self.list_records(&RecordFilter::default())?;

        let total = records.len();
        let mut embedded = 0usize;
        let mut skipped = 0usize;

        // 2. Drop and recreate vector table
        {
            let conn = self.conn.lock().unwrap();
            crate::vector::drop_embedding_table(&conn)?;
            crate::vector::ensure_embedding_table(&conn, new_dims)?;
        }

        // 3. Batch embed in chunks
        let batch_size = 32;
        for chunk in records.chunks(batch_size) {
            let non_empty: Vec<&StructuredRecord> = chunk
                .iter()
                .filter(|r| !r.embedding_text().trim().is_empty())
                .collect();

            skipped += chunk.len() - non_empty.len();

            if non_empty.is_empty() {
                continue;
            }

            let texts: Vec<String> = non_empty.iter().map(|r| r.embedding_text()).collect();
            let embeddings = embed_batch(texts)
                .await
                .map_err(|e| StoreError::InvalidData(format!("Embedding failed: {e}")))?;

            let conn = self.conn.lock().unwrap();
            for (record, embedding) in non_empty.iter().zip(embeddings.iter()) {
                crate::vector::upsert_embedding(&conn, &record.id, embedding)?;
                embedded += 1;
            }
        }

        // 4. Update metadata
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.dimensions', ?1)",
                params![new_dims.to_string()],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.provider', ?1)",
                params![new_provider],
            )?;
        }

        // 5. Clear stale flag
        *self.vectors_stale.lock().unwrap() = false;
        *self.vectors_initialized.lock().unwrap() = true;

        Ok(ReindexReport {
            total,
            embedded,
            skipped,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epistle_types::RecordType;

    fn record(id: &str, subject: &str) -> StructuredRecord {
        StructuredRecord {
            id: id.to_string(),
            record_type: RecordType::General,
            source_id: format!("src-{id}"),
            sender: "someone@example.com".to_string(),
            subject: subject.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            body_preview: String::new(),
            summary: format!("About {subject}"),
            amount: None,
            vendor: None,
            due_date: None,
            has_attachments: false,
            extraction_failed: false,
        }
    }

    fn create_test_store_with_vectors() -> RecordStore {
        crate::vector::init_vector_extension();
        let store = RecordStore::open_in_memory().unwrap();
        store.init_vectors(4, "mock").unwrap();
        store
    }

    #[test]
    fn test_record_with_embedding() {
        let store = create_test_store_with_vectors();

        store
            .commit_record(&record("r1", "cats"), Some(&[0.1, 0.2, 0.3, 0.4]), &[])
            .unwrap();

        assert!(store.has_embedding("r1").unwrap());
        assert_eq!(store.count_embeddings().unwrap(), 1);
    }

    #[test]
    fn test_vector_search_returns_records() {
        let store = create_test_store_with_vectors();

        store
            .commit_record(&record("r1", "cats"), Some(&[1.0, 0.0, 0.0, 0.0]), &[])
            .unwrap();
        store
            .commit_record(&record("r2", "dogs"), Some(&[0.0, 1.0, 0.0, 0.0]), &[])
            .unwrap();
        store
            .commit_record(&record("r3", "birds"), Some(&[0.0, 0.0, 1.0, 0.0]), &[])
            .unwrap();

        let results = store
            .search_similar_records(&[0.9, 0.1, 0.0, 0.0], 10)
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.id, "r1");
        assert_eq!(results[0].0.subject, "cats");
        for window in results.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
    }

    #[test]
    fn test_init_vectors_stores_metadata() {
        crate::vector::init_vector_extension();
        let store = RecordStore::open_in_memory().unwrap();
        store.init_vectors(384, "mock").unwrap();

        assert_eq!(
            store.get_meta("embedding.dimensions").unwrap(),
            Some("384".to_string())
        );
        assert_eq!(
            store.get_meta("embedding.provider").unwrap(),
            Some("mock".to_string())
        );
        assert!(store.has_vectors());
        assert!(!store.vectors_stale());
    }

    #[test]
    fn test_init_vectors_same_dims_ok() {
        crate::vector::init_vector_extension();
        let store = RecordStore::open_in_memory().unwrap();
        store.init_vectors(384, "mock").unwrap();
        store.init_vectors(384, "mock").unwrap();
        assert!(!store.vectors_stale());
    }

    #[test]
    fn test_init_vectors_dimension_mismatch_marks_stale() {
        crate::vector::init_vector_extension();
        let store = RecordStore::open_in_memory().unwrap();
        store.init_vectors(384, "mock").unwrap();
        assert!(!store.vectors_stale());

        store.init_vectors(1536, "openai").unwrap();
        assert!(store.vectors_stale());
    }

    #[test]
    fn test_stale_vectors_search_returns_empty() {
        let store = create_test_store_with_vectors();

        store
            .commit_record(&record("r1", "cats"), Some(&[0.1, 0.2, 0.3, 0.4]), &[])
            .unwrap();

        store.init_vectors(8, "openai").unwrap();
        assert!(store.vectors_stale());

        let results = store
            .search_similar_records(&[0.1, 0.2, 0.3, 0.4], 10)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_stats_includes_embedding_metadata() {
        let store = create_test_store_with_vectors();

        store
            .commit_record(&record("r1", "cats"), Some(&[0.1, 0.2, 0.3, 0.4]), &[])
            .unwrap();
        store.commit_record(&record("r2", "dogs"), None, &[]).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.embedding_count, 1);
        assert_eq!(stats.embedding_provider.as_deref(), Some("mock"));
        assert_eq!(stats.embedding_dimensions, Some(4));
        assert!(!stats.vectors_stale);
    }

    #[test]
    fn test_reindex_dry_run() {
        let store = RecordStore::open_in_memory().unwrap();
        store.commit_record(&record("r1", "hello world"), None, &[]).unwrap();
        store.commit_record(&record("r2", "rust is great"), None, &[]).unwrap();

        let dry = store.reindex_dry_run().unwrap();
        assert_eq!(dry.record_count, 2);
        assert!(dry.estimated_tokens > 0);
    }

    #[tokio::test]
    async fn test_reindex_reembeds_all_records() {
        let store = create_test_store_with_vectors();

        store.commit_record(&record("r1", "first"), None, &[]).unwrap();
        store.commit_record(&record("r2", "second"), None, &[]).unwrap();

        store.init_vectors(2, "new_provider").unwrap();
        assert!(store.vectors_stale());

        let report = store
            .reindex(
                |texts| async move { Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect()) },
                2,
                "new_provider",
            )
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.skipped, 0);
        assert!(!store.vectors_stale());

        assert_eq!(
            store.get_meta("embedding.dimensions").unwrap(),
            Some("2".to_string())
        );
        assert_eq!(
            store.get_meta("embedding.provider").unwrap(),
            Some("new_provider".to_string())
        );

        assert_eq!(store.count_embeddings().unwrap(), 2);
    }
}
