//! Vector index lifecycle and lookups.

use tracing::{info, warn};

use crate::error::{MemoryError, Result};
use crate::types::ContentType;
use crate::validation::validate_embedding;
use crate::vector::{self, VectorHit};

use super::{META_EMBEDDING_DIMS, META_EMBEDDING_PROVIDER, MemoryStore, get_meta, set_meta};

impl MemoryStore {
    /// Initialize vector storage with dimension mismatch detection.
    ///
    /// Records the embedding dimensions and provider name in the metadata
    /// table. If previously stored dimensions differ, vectors are marked stale
    /// and vector search stays unavailable until [`MemoryStore::reindex`] runs.
    ///
    /// Without the sqlite-vec extension this logs a warning and leaves the
    /// store in keyword-only mode.
    pub fn init_vectors(&self, dims: usize, provider: &str) -> Result<()> {
        if dims == 0 {
            return Err(MemoryError::InvalidData(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if !self.vectors.lock().extension_loaded {
            warn!("sqlite-vec extension not loaded; vector search disabled");
            return Ok(());
        }

        let stale = {
            let conn = self.conn.lock();
            let stored_dims = get_meta(&conn, META_EMBEDDING_DIMS)?.and_then(|s| s.parse::<usize>().ok());

            match stored_dims {
                Some(old_dims) if old_dims != dims => {
                    warn!(
                        "Embedding dimension mismatch: stored={}, configured={}. \
                         Vector search disabled until reindex. Run `sift reindex`.",
                        old_dims, dims
                    );
                    true
                }
                _ => {
                    vector::create_vector_table(&conn, dims)?;
                    set_meta(&conn, META_EMBEDDING_DIMS, &dims.to_string())?;
                    set_meta(&conn, META_EMBEDDING_PROVIDER, provider)?;
                    false
                }
            }
        };

        {
            let mut state = self.vectors.lock();
            state.initialized = true;
            state.table_exists = true;
            state.stale = stale;
            state.dims = Some(dims);
        }

        // Embeddings persisted while vectors were unavailable have no entries yet.
        if !stale {
            let stats = self.stats()?;
            if stats.vector_count != stats.embedded_count {
                info!(
                    vectors = stats.vector_count,
                    embedded = stats.embedded_count,
                    "vector index out of date, rebuilding from stored embeddings"
                );
                self.rebuild_vector_index()?;
            }
        }

        Ok(())
    }

    /// Whether vector lookups are currently served.
    pub fn vectors_available(&self) -> bool {
        self.vectors.lock().available()
    }

    /// Check if vector embeddings are stale (dimension mismatch).
    pub fn vectors_stale(&self) -> bool {
        self.vectors.lock().stale
    }

    /// Whether the sqlite-vec extension is loaded.
    pub fn vector_extension_loaded(&self) -> bool {
        self.vectors.lock().extension_loaded
    }

    /// Configured embedding dimensions, once `init_vectors` has run.
    pub fn vector_dims(&self) -> Option<usize> {
        self.vectors.lock().dims
    }

    /// k-NN search over the vector index, ascending by distance.
    ///
    /// Fails with [`MemoryError::Unavailable`] when vectors are not served and
    /// with a dimension-mismatch validation error when the query vector has
    /// the wrong size. Runs on the vector read connection for file-backed stores.
    pub fn search_vectors(
        &self,
        query: &[f32],
        k: usize,
        content_type: Option<ContentType>,
    ) -> Result<Vec<VectorHit>> {
        let state = *self.vectors.lock();
        if !state.available() {
            return Err(MemoryError::Unavailable(if state.stale {
                "vector index is stale; reindex required".to_string()
            } else {
                "vector index is not initialized".to_string()
            }));
        }
        if let Some(dims) = state.dims {
            validate_embedding(query, dims)?;
        }

        let conn = self.vector_reader();
        vector::knn(&conn, query, k, content_type)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
