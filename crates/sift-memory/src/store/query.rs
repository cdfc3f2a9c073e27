//! Report types returned by store queries and maintenance operations.

use std::time::Duration;

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Database statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Rows in `memories`.
    pub record_count: usize,
    /// Records carrying an embedding.
    pub embedded_count: usize,
    /// Entries in the keyword index.
    pub keyword_count: usize,
    /// Entries in the vector index (0 when it does not exist).
    pub vector_count: usize,
    /// Record counts per content type, sorted by type name.
    pub by_content_type: Vec<(String, usize)>,
    /// Provider that produced the stored vectors.
    pub embedding_provider: Option<String>,
    /// Dimensions of the stored vectors.
    pub embedding_dimensions: Option<usize>,
    /// Whether vector lookups are served.
    pub vectors_available: bool,
    /// Whether stored vectors need a reindex.
    pub vectors_stale: bool,
    pub schema_version: i32,
}

/// Index health as seen by callers of the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub vector_index_available: bool,
    pub vector_index_size: usize,
    pub keyword_index_size: usize,
    pub total_records: usize,
    pub records_with_embeddings: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reindex
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a full re-embedding pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    /// Records visited.
    pub total: usize,
    /// Records that received a fresh embedding.
    pub embedded: usize,
    /// Records skipped (empty content).
    pub skipped: usize,
    /// Records written by someone else while the reindex was embedding.
    pub superseded: usize,
    /// Wall-clock time taken.
    pub elapsed: Duration,
}

/// Work estimate for a reindex, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexDryRun {
    pub record_count: usize,
    /// Rough token estimate (characters / 4).
    pub estimated_tokens: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Consistency
// ─────────────────────────────────────────────────────────────────────────────

/// Divergence between the records table and its projections.
///
/// Every list holds record ids. A consistent store has all of them empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Records with no keyword entry.
    pub missing_keyword: Vec<String>,
    /// Keyword entries with no record.
    pub orphaned_keyword: Vec<String>,
    /// Records with an embedding but no vector entry.
    pub missing_vector: Vec<String>,
    /// Vector entries with no record.
    pub orphaned_vector: Vec<String>,
    /// Vector entries filed under a different content type than their record.
    pub misplaced_vector: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_keyword.is_empty()
            && self.orphaned_keyword.is_empty()
            && self.missing_vector.is_empty()
            && self.orphaned_vector.is_empty()
            && self.misplaced_vector.is_empty()
    }

    /// Total number of problems found.
    pub fn issue_count(&self) -> usize {
        self.missing_keyword.len()
            + self.orphaned_keyword.len()
            + self.missing_vector.len()
            + self.orphaned_vector.len()
            + self.misplaced_vector.len()
    }
}
