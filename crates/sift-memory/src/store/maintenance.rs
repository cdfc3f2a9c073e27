//! Maintenance: consistency checks, projection rebuilds and re-embedding.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::error::{MemoryError, Result};
use crate::types::MemoryId;
use crate::validation::validate_embedding;
use crate::vector::{self, blob_to_embedding, embedding_to_blob};

use super::{
    ConsistencyReport, META_EMBEDDING_DIMS, META_EMBEDDING_PROVIDER, MemoryStore, ReindexDryRun,
    ReindexReport, set_meta,
};

/// Records embedded per provider call during reindex.
const REINDEX_BATCH_SIZE: usize = 32;

impl MemoryStore {
    /// Compare the records table against both projections.
    ///
    /// Vector entries are only expected while the vector index is available,
    /// but any entry that exists must sit in its record's content-type
    /// partition.
    pub fn check_consistency(&self) -> Result<ConsistencyReport> {
        let state = *self.vectors.lock();
        let conn = self.conn.lock();

        let mut records: HashMap<String, String> = HashMap::new();
        let mut embedded = HashSet::new();
        {
            let mut stmt = conn.prepare("SELECT id, content_type, embedding FROM memories")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let content_type: String = row.get(1)?;
                let blob: Option<Vec<u8>> = row.get(2)?;
                let expects_vector = match (blob, state.dims) {
                    (Some(blob), Some(dims)) => blob.len() == dims * 4,
                    _ => false,
                };
                if expects_vector {
                    embedded.insert(id.clone());
                }
                records.insert(id, content_type);
            }
        }
        let record_ids: HashSet<String> = records.keys().cloned().collect();

        let keywords = crate::keyword::keyword_ids(&conn)?;
        let vectors = if state.extension_loaded && vector::vector_table_exists(&conn)? {
            vector::vector_partitions(&conn)?
        } else {
            HashMap::new()
        };
        let vector_ids: HashSet<String> = vectors.keys().cloned().collect();

        let mut misplaced_vector: Vec<String> = vectors
            .iter()
            .filter(|(id, partition)| records.get(*id).is_some_and(|ct| ct != *partition))
            .map(|(id, _)| id.clone())
            .collect();
        misplaced_vector.sort();

        let mut report = ConsistencyReport {
            missing_keyword: difference(&record_ids, &keywords),
            orphaned_keyword: difference(&keywords, &record_ids),
            missing_vector: Vec::new(),
            orphaned_vector: difference(&vector_ids, &record_ids),
            misplaced_vector,
        };
        if state.available() {
            report.missing_vector = difference(&embedded, &vector_ids);
        }

        if !report.is_consistent() {
            warn!(issues = report.issue_count(), "index consistency check failed");
        }
        Ok(report)
    }

    /// Rebuild the keyword index from the records table.
    ///
    /// Returns the number of entries written.
    pub fn rebuild_keyword_index(&self) -> Result<usize> {
        let indexed = self.with_transaction(|conn| {
            conn.execute("DELETE FROM memory_fts", [])?;
            let rows = conn.execute(
                r#"
                INSERT INTO memory_fts (record_id, content_type, created_at, content)
                SELECT id, content_type, created_at, content FROM memories
                "#,
                [],
            )?;
            conn.execute_batch(crate::keyword::REFILL_KEYWORD_ROWIDS)?;
            Ok(rows)
        })?;

        info!("Rebuilt keyword index ({} entries)", indexed);
        Ok(indexed)
    }

    /// Rebuild the vector index from embeddings stored on records.
    ///
    /// Records whose stored embedding has the wrong size are skipped.
    /// Returns the number of entries written.
    pub fn rebuild_vector_index(&self) -> Result<usize> {
        let state = *self.vectors.lock();
        let dims = match state.dims {
            Some(dims) if state.available() => dims,
            _ => {
                return Err(MemoryError::Unavailable(
                    "vector index is not available; run reindex".to_string(),
                ));
            }
        };

        let indexed = self.with_transaction(|conn| {
            vector::drop_vector_table(conn)?;
            vector::create_vector_table(conn, dims)?;
            backfill_vectors(conn, dims)
        })?;

        info!("Rebuilt vector index ({} entries)", indexed);
        Ok(indexed)
    }

    /// Dry-run reindex: returns counts without doing any work.
    pub fn reindex_dry_run(&self) -> Result<ReindexDryRun> {
        let conn = self.conn.lock();
        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let total_chars: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM memories",
            [],
            |row| row.get(0),
        )?;
        Ok(ReindexDryRun {
            record_count: record_count as usize,
            estimated_tokens: (total_chars as usize) / 4,
        })
    }

    /// Re-embed every record and rebuild the vector index with new dimensions.
    ///
    /// The `embed_batch` closure receives a batch of texts and returns their
    /// embeddings, which keeps this crate independent of any provider. All
    /// embeddings are computed first; the records, the vector table and the
    /// metadata are then replaced in one transaction, so a provider failure
    /// leaves the store untouched.
    ///
    /// Embedding runs without holding the writer lock. A record written in
    /// the meantime keeps what that write stored and is counted as
    /// `superseded`; it gets a vector entry only if its embedding already has
    /// the new dimensions.
    pub async fn reindex<F, Fut>(
        &self,
        embed_batch: F,
        new_dims: usize,
        new_provider: &str,
    ) -> Result<ReindexReport>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<Vec<f32>>, String>>,
    {
        let start = std::time::Instant::now();
        if !self.vector_extension_loaded() {
            return Err(MemoryError::Unavailable(
                "sqlite-vec extension not loaded".to_string(),
            ));
        }

        // 1. Read all records, with the version each embedding will replace
        let records: Vec<(String, String, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id, content, updated_at FROM memories")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let total = records.len();
        let mut skipped = 0usize;
        let mut embeddings: HashMap<&str, Vec<f32>> = HashMap::with_capacity(total);

        // 2. Batch embed in chunks, outside any lock
        for chunk in records.chunks(REINDEX_BATCH_SIZE) {
            let non_empty: Vec<&(String, String, String)> = chunk
                .iter()
                .filter(|(_, content, _)| !content.trim().is_empty())
                .collect();
            skipped += chunk.len() - non_empty.len();
            if non_empty.is_empty() {
                continue;
            }

            let texts: Vec<String> = non_empty.iter().map(|(_, c, _)| c.clone()).collect();
            let batch = embed_batch(texts)
                .await
                .map_err(|e| MemoryError::InvalidData(format!("Embedding failed: {e}")))?;
            if batch.len() != non_empty.len() {
                return Err(MemoryError::InvalidData(format!(
                    "Embedding batch returned {} vectors for {} texts",
                    batch.len(),
                    non_empty.len()
                )));
            }

            for ((id, _, _), embedding) in non_empty.into_iter().zip(batch) {
                validate_embedding(&embedding, new_dims)?;
                embeddings.insert(id.as_str(), embedding);
            }
        }

        // 3. Swap everything in atomically, skipping rows changed since step 1
        let (embedded, superseded) = self.with_transaction(|conn| {
            vector::drop_vector_table(conn)?;
            vector::create_vector_table(conn, new_dims)?;

            let mut update = conn
                .prepare("UPDATE memories SET embedding = ?2 WHERE id = ?1 AND updated_at = ?3")?;
            let (mut embedded, mut superseded) = (0usize, 0usize);
            for (id, _, updated_at) in &records {
                let embedding = embeddings.get(id.as_str());
                let rows = update.execute(params![
                    id,
                    embedding.map(|e| embedding_to_blob(e)),
                    updated_at
                ])?;
                if rows == 0 {
                    superseded += 1;
                } else if embedding.is_some() {
                    embedded += 1;
                }
            }

            backfill_vectors(conn, new_dims)?;
            set_meta(conn, META_EMBEDDING_DIMS, &new_dims.to_string())?;
            set_meta(conn, META_EMBEDDING_PROVIDER, new_provider)?;
            Ok((embedded, superseded))
        })?;

        // 4. Clear stale flag
        {
            let mut state = self.vectors.lock();
            state.initialized = true;
            state.table_exists = true;
            state.stale = false;
            state.dims = Some(new_dims);
        }

        if superseded > 0 {
            warn!(superseded, "records changed during reindex kept their own embeddings");
        }
        info!(total, embedded, skipped, "Reindex complete");
        Ok(ReindexReport {
            total,
            embedded,
            skipped,
            superseded,
            elapsed: start.elapsed(),
        })
    }
}

fn difference(left: &HashSet<String>, right: &HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = left.difference(right).cloned().collect();
    ids.sort();
    ids
}

/// Insert vector entries for every stored embedding of the right size.
fn backfill_vectors(conn: &Connection, dims: usize) -> Result<usize> {
    let mut stmt =
        conn.prepare("SELECT id, content_type, embedding FROM memories WHERE embedding IS NOT NULL")?;
    let mut rows = stmt.query([])?;

    let mut indexed = 0;
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let content_type: String = row.get(1)?;
        let blob: Vec<u8> = row.get(2)?;

        let embedding = blob_to_embedding(&blob)?;
        if embedding.len() != dims {
            continue;
        }
        vector::upsert_vector(conn, MemoryId::parse(&id)?, content_type.parse()?, &embedding)?;
        indexed += 1;
    }
    Ok(indexed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
