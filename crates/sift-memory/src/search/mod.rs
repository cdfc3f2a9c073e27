//! Hybrid search engine: the async façade over the store and both indexes.
//!
//! ```text
//! search(query)
//!   ├─ embed(query.text)              best effort, under the deadline
//!   ├─ join!( vector knn , keyword match )   spawn_blocking, under the deadline
//!   ├─ RRF fusion (full outer join)
//!   ├─ hydrate records, sort, threshold, limit
//!   └─ touch access stats              detached, best effort
//! ```
//!
//! Search-path failures degrade: an embedding failure or an unavailable
//! vector index gives keyword-only results, a keyword failure gives
//! vector-only results. Only when the keyword index fails and the vector
//! index is structurally unavailable does `search` return an error.

pub mod fusion;
pub mod query;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::embedding::{EmbeddingFailure, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::metrics::{ErrorCategory, MetricsSnapshot, QualityMetrics, QueryType, Severity};
use crate::store::{Diagnostics, MemoryStore};
use crate::types::{ContentType, MemoryId, MemoryRecord, RecordUpdate};
use crate::validation::{ValidationError, validate_record};

pub use fusion::{FusedCandidate, FusionParams, compare_results, fuse, rrf_term};
pub use query::{SearchQuery, SearchResult};

/// Time each index lookup still gets after the embedding step used up the deadline.
const LOOKUP_GRACE: Duration = Duration::from_millis(250);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Defaults applied to queries built with [`HybridSearchEngine::query`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub k: usize,
    pub rrf_k: f64,
    pub weight_vector: f64,
    pub weight_keyword: f64,
    pub relevance_threshold: Option<f64>,
    /// Deadline for searches that don't set their own.
    pub timeout: Option<Duration>,
    /// How many top results the diversity metric looks at.
    pub diversity_top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k: query::DEFAULT_K,
            rrf_k: query::DEFAULT_RRF_K,
            weight_vector: query::DEFAULT_WEIGHT,
            weight_keyword: query::DEFAULT_WEIGHT,
            relevance_threshold: None,
            timeout: None,
            diversity_top_n: 5,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one index lookup.
#[derive(Debug)]
enum Lookup<T> {
    Hits(Vec<T>),
    /// Not attempted (no query embedding).
    Skipped,
    /// The index is not serving.
    Unavailable,
    Failed(MemoryError),
    TimedOut,
}

impl<T> Lookup<T> {
    fn hits(&self) -> Option<&[T]> {
        match self {
            Self::Hits(hits) => Some(hits),
            _ => None,
        }
    }
}

/// Stores records and answers hybrid vector + keyword searches.
pub struct HybridSearchEngine {
    store: Arc<MemoryStore>,
    embedder: Option<EmbeddingProvider>,
    metrics: Arc<QualityMetrics>,
    config: EngineConfig,
}

impl std::fmt::Debug for HybridSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearchEngine")
            .field("store", &self.store)
            .field("embedder", &self.embedder)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HybridSearchEngine {
    /// Create an engine without an embedder (keyword-only until one is set).
    pub fn new(store: Arc<MemoryStore>, config: EngineConfig) -> Self {
        let metrics = Arc::new(QualityMetrics::new(config.diversity_top_n));
        Self {
            store,
            embedder: None,
            metrics,
            config,
        }
    }

    /// Set the embedding provider used for stores and queries.
    pub fn with_embedder(mut self, embedder: EmbeddingProvider) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Share a metrics registry with other components.
    pub fn with_metrics(mut self, metrics: Arc<QualityMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The underlying store.
    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared metrics registry.
    pub fn quality_metrics(&self) -> &Arc<QualityMetrics> {
        &self.metrics
    }

    /// Snapshot of quality metrics and recent errors.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// A query pre-filled with this engine's defaults.
    pub fn query(&self, text: impl Into<String>) -> SearchQuery {
        SearchQuery {
            text: text.into(),
            k: self.config.k,
            rrf_k: self.config.rrf_k,
            weight_vector: self.config.weight_vector,
            weight_keyword: self.config.weight_keyword,
            content_type: None,
            relevance_threshold: self.config.relevance_threshold,
            limit: None,
            timeout: self.config.timeout,
        }
    }

    // ─── Writes ──────────────────────────────────────────────────────────────

    /// Store new content and index it.
    ///
    /// Embedding is best effort: on failure the record is stored without one
    /// and stays keyword-searchable. A failed write is always an error.
    pub async fn store(
        &self,
        content: impl Into<String>,
        content_type: ContentType,
        relevance_score: Option<f64>,
    ) -> Result<MemoryId> {
        let started = Instant::now();
        let mut record = MemoryRecord::new(content_type, content);
        if let Some(score) = relevance_score {
            record = record.with_relevance(score);
        }
        if let Err(e) = validate_record(&record) {
            self.track(&e, Severity::Low, "store rejected");
            return Err(e);
        }

        record.embedding = self.embed_for_write(&record.content).await;
        let id = record.id;
        let has_embedding = record.has_embedding();

        match run_blocking(&self.store, move |s| s.insert_record(&record)).await {
            Ok(()) => {
                self.metrics.record_write(started.elapsed());
                info!(record_id = %id, %content_type, has_embedding, "Stored memory");
                Ok(id)
            }
            Err(e) => {
                self.track(&e, Severity::High, "store failed");
                Err(e)
            }
        }
    }

    /// Change a record's content, type or relevance and re-index it.
    ///
    /// New content is re-embedded; a type change moves the vector entry to
    /// the new partition.
    pub async fn update(&self, id: MemoryId, update: RecordUpdate) -> Result<MemoryRecord> {
        let started = Instant::now();
        let Some(mut record) = self.get(id).await? else {
            let e = MemoryError::NotFound(format!("Record {id}"));
            self.track(&e, Severity::Low, "update rejected");
            return Err(e);
        };

        let reembed = update.changes_content(&record) || record.embedding.is_none();
        update.apply(&mut record);
        if let Err(e) = validate_record(&record) {
            self.track(&e, Severity::Low, "update rejected");
            return Err(e);
        }
        if reembed {
            record.embedding = self.embed_for_write(&record.content).await;
        }

        let stored = record.clone();
        match run_blocking(&self.store, move |s| s.update_record(&stored)).await {
            Ok(()) => {
                self.metrics.record_write(started.elapsed());
                info!(record_id = %id, reembedded = reembed, "Updated memory");
                Ok(record)
            }
            Err(e) => {
                self.track(&e, Severity::High, "update failed");
                Err(e)
            }
        }
    }

    /// Delete a record and its index entries. Returns `false` if it did not exist.
    pub async fn delete(&self, id: MemoryId) -> Result<bool> {
        let started = Instant::now();
        match run_blocking(&self.store, move |s| s.delete_record(id)).await {
            Ok(deleted) => {
                self.metrics.record_write(started.elapsed());
                if deleted {
                    info!(record_id = %id, "Deleted memory");
                }
                Ok(deleted)
            }
            Err(e) => {
                self.track(&e, Severity::High, "delete failed");
                Err(e)
            }
        }
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        run_blocking(&self.store, move |s| s.get_record(id))
            .await
            .inspect_err(|e| self.track(e, Severity::Medium, "get failed"))
    }

    /// Index availability and sizes.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        run_blocking(&self.store, |s| s.diagnostics()).await
    }

    // ─── Search ──────────────────────────────────────────────────────────────

    /// Hybrid search.
    ///
    /// Empty or invalid queries return an empty list. Ordering is
    /// deterministic for a fixed index state.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>> {
        let started = Instant::now();

        if let Err(e) = query.validate() {
            if e == ValidationError::EmptyQuery {
                self.metrics.record_empty_query();
            }
            self.metrics
                .record_error(ErrorCategory::Validation, Severity::Low, e.to_string());
            return Ok(Vec::new());
        }

        let deadline = query.timeout.map(|t| started + t);
        let vector_available = self.store.vectors_available();

        // 1. Query embedding (skipped entirely when vectors can't be served)
        let embedding = if vector_available {
            self.embed_query(&query.text, deadline).await
        } else {
            debug!("vector index unavailable; keyword-only search");
            None
        };

        // 2. Both lookups concurrently
        let lookup_deadline = deadline.map(|d| d.max(Instant::now() + LOOKUP_GRACE));
        let (vector, keyword) = tokio::join!(
            self.vector_lookup(embedding, &query, vector_available, lookup_deadline),
            self.keyword_lookup(&query, lookup_deadline),
        );

        let query_type = match (vector.hits().is_some(), keyword.hits().is_some()) {
            (true, true) => Some(QueryType::Hybrid),
            (true, false) => Some(QueryType::Vector),
            (false, true) => Some(QueryType::Keyword),
            (false, false) => None,
        };

        if let Lookup::Failed(ref e) = keyword
            && !vector_available
        {
            let message = format!("keyword index failed and vector index unavailable: {e}");
            self.metrics
                .record_error(ErrorCategory::KeywordSearch, Severity::Critical, message.clone());
            return Err(MemoryError::Unavailable(message));
        }

        // 3. Fusion
        let params = FusionParams {
            rrf_k: query.rrf_k,
            weight_vector: query.weight_vector,
            weight_keyword: query.weight_keyword,
        };
        let candidates = fuse(
            vector.hits().unwrap_or_default(),
            keyword.hits().unwrap_or_default(),
            params,
        );
        if candidates.is_empty() {
            self.metrics.record_zero_results(query_type, started.elapsed());
            debug!(query = %query.text, "no candidates");
            return Ok(Vec::new());
        }

        // 4. Hydrate, order, filter
        let mut results = match self.hydrate(candidates).await {
            Ok(results) => results,
            Err(e) => {
                self.track(&e, Severity::High, "loading search results failed");
                return Err(e);
            }
        };
        results.sort_by(compare_results);
        if let Some(threshold) = query.relevance_threshold {
            results.retain(|r| r.combined_score >= threshold);
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        let latency = started.elapsed();
        if results.is_empty() {
            self.metrics.record_zero_results(query_type, latency);
            return Ok(results);
        }
        if let Some(query_type) = query_type {
            self.metrics.record_search(query_type, latency, &results);
        }
        debug!(
            results = results.len(),
            ?query_type,
            latency_ms = latency.as_millis() as u64,
            "search complete"
        );

        // 5. Access bookkeeping, detached
        self.touch(results.iter().map(|r| r.record_id).collect());

        Ok(results)
    }

    async fn vector_lookup(
        &self,
        embedding: Option<Vec<f32>>,
        query: &SearchQuery,
        vector_available: bool,
        deadline: Option<Instant>,
    ) -> Lookup<crate::vector::VectorHit> {
        if !vector_available {
            return Lookup::Unavailable;
        }
        let Some(embedding) = embedding else {
            return Lookup::Skipped;
        };

        let (k, content_type) = (query.k, query.content_type);
        let task = run_blocking(&self.store, move |s| {
            s.search_vectors(&embedding, k, content_type)
        });

        match with_deadline(deadline, task).await {
            Some(Ok(hits)) => Lookup::Hits(hits),
            Some(Err(MemoryError::Unavailable(reason))) => {
                debug!(%reason, "vector lookup unavailable");
                Lookup::Unavailable
            }
            Some(Err(e)) => {
                // Includes dimension mismatch: vector search is off for this query only.
                self.metrics.record_error(
                    ErrorCategory::VectorSearch,
                    Severity::Medium,
                    format!("vector lookup failed: {e}"),
                );
                Lookup::Failed(e)
            }
            None => {
                self.metrics.record_error(
                    ErrorCategory::VectorSearch,
                    Severity::Medium,
                    "vector lookup timed out",
                );
                Lookup::TimedOut
            }
        }
    }

    async fn keyword_lookup(
        &self,
        query: &SearchQuery,
        deadline: Option<Instant>,
    ) -> Lookup<crate::keyword::KeywordHit> {
        let text = query.text.clone();
        let (k, content_type) = (query.k, query.content_type);
        let task = run_blocking(&self.store, move |s| {
            s.search_keywords(&text, k, content_type)
        });

        match with_deadline(deadline, task).await {
            Some(Ok(hits)) => Lookup::Hits(hits),
            Some(Err(e)) => {
                self.metrics.record_error(
                    ErrorCategory::KeywordSearch,
                    Severity::High,
                    format!("keyword lookup failed: {e}"),
                );
                Lookup::Failed(e)
            }
            None => {
                self.metrics.record_error(
                    ErrorCategory::KeywordSearch,
                    Severity::Medium,
                    "keyword lookup timed out",
                );
                Lookup::TimedOut
            }
        }
    }

    /// Load records for fused candidates. Index entries without a record are
    /// logged and skipped.
    async fn hydrate(&self, candidates: Vec<FusedCandidate>) -> Result<Vec<SearchResult>> {
        let ids: Vec<MemoryId> = candidates.iter().map(|c| c.record_id).collect();
        let records = run_blocking(&self.store, move |s| s.get_records(&ids)).await?;
        let mut by_id: std::collections::HashMap<MemoryId, MemoryRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(record) = by_id.remove(&candidate.record_id) else {
                self.metrics.record_error(
                    ErrorCategory::Database,
                    Severity::Medium,
                    format!("index entry {} has no record", candidate.record_id),
                );
                continue;
            };
            results.push(SearchResult {
                record_id: record.id,
                content: record.content,
                content_type: record.content_type,
                vector_rank: candidate.vector_rank,
                keyword_rank: candidate.keyword_rank,
                combined_score: candidate.combined_score,
                vector_distance: candidate.vector_distance,
                keyword_score: candidate.keyword_score,
                created_at: record.created_at,
                relevance_score: record.relevance_score,
            });
        }
        Ok(results)
    }

    fn touch(&self, ids: Vec<MemoryId>) {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.touch_records(&ids) {
                metrics.record_error(
                    ErrorCategory::Database,
                    Severity::Low,
                    format!("access bookkeeping failed: {e}"),
                );
            }
        });
    }

    // ─── Embedding ───────────────────────────────────────────────────────────

    async fn embed_query(&self, text: &str, deadline: Option<Instant>) -> Option<Vec<f32>> {
        let provider = self.embedder.as_ref()?;
        match with_deadline(deadline, provider.embed(text)).await {
            Some(Ok(embedding)) => Some(embedding),
            Some(Err(e)) => {
                self.embedding_failed(&e);
                None
            }
            None => {
                self.metrics.record_error(
                    ErrorCategory::Embedding,
                    Severity::Medium,
                    "query embedding timed out; falling back to keyword-only",
                );
                None
            }
        }
    }

    async fn embed_for_write(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.embedder.as_ref()?;
        let embedding = match provider.embed(text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                self.embedding_failed(&e);
                return None;
            }
        };

        if let Some(dims) = self.store.vector_dims()
            && dims != embedding.len()
        {
            self.metrics.record_error(
                ErrorCategory::Embedding,
                Severity::Medium,
                format!(
                    "provider returned {} dimensions, index expects {dims}; storing without embedding",
                    embedding.len()
                ),
            );
            return None;
        }
        Some(embedding)
    }

    fn embedding_failed(&self, e: &EmbeddingFailure) {
        if matches!(e, EmbeddingFailure::EmptyInput) {
            return;
        }
        self.metrics.record_error(
            ErrorCategory::Embedding,
            Severity::Medium,
            format!("embedding failed: {e}"),
        );
    }

    fn track(&self, e: &MemoryError, severity: Severity, context: &str) {
        self.metrics
            .record_error(e.category(), severity, format!("{context}: {e}"));
    }
}

/// Run store work on the blocking pool.
async fn run_blocking<T, F>(store: &Arc<MemoryStore>, f: F) -> Result<T>
where
    F: FnOnce(&MemoryStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| MemoryError::Task(e.to_string()))?
}

/// Await `fut`, giving up at `deadline`. `None` means the deadline passed.
async fn with_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use sift_embed::{EmbedError, Embedder, MockEmbedder, SharedEmbedder};

    const DIMS: usize = 4;

    /// Returns a fixed vector per known text, a default otherwise.
    struct KeyedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl KeyedEmbedder {
        fn new(pairs: &[(&str, [f32; DIMS])]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Embedder for KeyedEmbedder {
        async fn embed(&self, text: &str) -> sift_embed::Result<Vec<f32>> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0, 0.0, 1.0]))
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        fn name(&self) -> &str {
            "keyed"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> sift_embed::Result<Vec<f32>> {
            Err(EmbedError::Network("connection refused".to_string()))
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> sift_embed::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0; DIMS])
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        fn name(&self) -> &str {
            "slow"
        }
    }

    fn engine_with(embedder: SharedEmbedder) -> HybridSearchEngine {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        store.init_vectors(embedder.dimensions(), embedder.name()).unwrap();
        HybridSearchEngine::new(store, EngineConfig::default())
            .with_embedder(EmbeddingProvider::new(embedder))
    }

    fn keyword_only_engine() -> HybridSearchEngine {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        HybridSearchEngine::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_store_projects_into_both_indexes() {
        let engine = engine_with(Arc::new(MockEmbedder::new(64)));
        let id = engine
            .store("the quick brown fox jumps", ContentType::Learning, None)
            .await
            .unwrap();

        let record = engine.get(id).await.unwrap().unwrap();
        let embedding = record.embedding.clone().unwrap();
        let store = engine.memory_store();

        let vector_hits = store.search_vectors(&embedding, 1, None).unwrap();
        assert_eq!(vector_hits[0].record_id, id);
        assert!(vector_hits[0].distance < 1e-4);

        let keyword_hits = store.search_keywords("brown fox", 5, None).unwrap();
        assert_eq!(keyword_hits[0].record_id, id);

        // Same holds after an update.
        engine
            .update(id, RecordUpdate::new().content("lazy dog sleeps"))
            .await
            .unwrap();
        let record = engine.get(id).await.unwrap().unwrap();
        let embedding = record.embedding.unwrap();
        assert_eq!(store.search_vectors(&embedding, 1, None).unwrap()[0].record_id, id);
        assert_eq!(store.search_keywords("lazy", 5, None).unwrap()[0].record_id, id);
        assert!(store.search_keywords("fox", 5, None).unwrap().is_empty());
        assert!(store.check_consistency().unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_vector_only_hit_scores_single_term() {
        let engine = engine_with(Arc::new(KeyedEmbedder::new(&[
            ("semantic", [1.0, 0.0, 0.0, 0.0]),
            ("meaning of words", [1.0, 0.0, 0.0, 0.0]),
        ])));
        let id = engine
            .store("meaning of words", ContentType::Documentation, None)
            .await
            .unwrap();

        let query = engine.query("semantic").with_weights(2.0, 1.0);
        let results = engine.search(query).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, id);
        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[0].keyword_rank, None);
        assert_eq!(results[0].combined_score, 2.0 / (60.0 + 1.0));
    }

    #[tokio::test]
    async fn test_found_by_both_outranks_single_method() {
        let engine = engine_with(Arc::new(KeyedEmbedder::new(&[
            ("borrow checker", [1.0, 0.0, 0.0, 0.0]),
            ("borrow checker rules", [1.0, 0.0, 0.0, 0.0]),
            ("ownership semantics", [0.9, 0.1, 0.0, 0.0]),
        ])));
        let both = engine
            .store("borrow checker rules", ContentType::Learning, None)
            .await
            .unwrap();
        engine
            .store("ownership semantics", ContentType::Learning, None)
            .await
            .unwrap();

        let results = engine.search(engine.query("borrow checker")).await.unwrap();
        assert_eq!(results[0].record_id, both);
        assert!(results[0].found_by_both());
        assert!(results[0].combined_score > results[1].combined_score);

        let snapshot = engine.metrics();
        assert_eq!(snapshot.searches[&QueryType::Hybrid], 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_search() {
        let engine = engine_with(Arc::new(MockEmbedder::new(32)));
        let content = "ephemeral configuration detail";
        let id = engine.store(content, ContentType::Context, None).await.unwrap();
        assert_eq!(engine.search(engine.query(content)).await.unwrap().len(), 1);

        assert!(engine.delete(id).await.unwrap());
        assert!(engine.search(engine.query(content)).await.unwrap().is_empty());

        let diagnostics = engine.diagnostics().await.unwrap();
        assert_eq!(diagnostics.total_records, 0);
        assert_eq!(diagnostics.vector_index_size, 0);
        assert_eq!(diagnostics.keyword_index_size, 0);
        assert!(!engine.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_keyword() {
        let engine = engine_with(Arc::new(FailingEmbedder));
        let id = engine
            .store("retry budget exhausted", ContentType::Error, None)
            .await
            .unwrap();
        assert!(!engine.get(id).await.unwrap().unwrap().has_embedding());

        let results = engine.search(engine.query("retry budget")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword_rank, Some(1));
        assert_eq!(results[0].vector_rank, None);

        // Provider failures are query-scoped.
        assert!(engine.diagnostics().await.unwrap().vector_index_available);
        assert!(engine.quality_metrics().error_count(ErrorCategory::Embedding) >= 2);
    }

    #[tokio::test]
    async fn test_content_type_filter_applies_to_both_methods() {
        let engine = engine_with(Arc::new(KeyedEmbedder::new(&[
            ("parser", [0.8, 0.6, 0.0, 0.0]),
            ("parser combinator in rust", [1.0, 0.0, 0.0, 0.0]),
            ("parser guide", [0.7, 0.7, 0.0, 0.0]),
            ("tokenizer guide", [0.0, 1.0, 0.0, 0.0]),
        ])));
        engine
            .store("parser combinator in rust", ContentType::Code, None)
            .await
            .unwrap();
        let guide = engine
            .store("parser guide", ContentType::Documentation, None)
            .await
            .unwrap();
        let tokenizer = engine
            .store("tokenizer guide", ContentType::Documentation, None)
            .await
            .unwrap();

        let query = engine
            .query("parser")
            .with_content_type(ContentType::Documentation);
        let results = engine.search(query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.content_type == ContentType::Documentation));
        assert_eq!(results[0].record_id, guide);
        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[0].keyword_rank, Some(1));
        assert_eq!(results[1].record_id, tokenizer);
        assert!(results[0].combined_score > results[1].combined_score);
    }

    #[tokio::test]
    async fn test_exact_phrase_ranks_first_by_keyword() {
        let engine = engine_with(Arc::new(MockEmbedder::new(128)));
        let target = engine
            .store(
                "vector search using approximate nearest neighbor",
                ContentType::Documentation,
                None,
            )
            .await
            .unwrap();
        engine
            .store("nearest grocery store hours", ContentType::Context, None)
            .await
            .unwrap();
        engine
            .store("sorting algorithms overview", ContentType::Documentation, None)
            .await
            .unwrap();

        let results = engine
            .search(engine.query("approximate nearest neighbor"))
            .await
            .unwrap();
        let hit = results.iter().find(|r| r.record_id == target).unwrap();
        assert_eq!(hit.keyword_rank, Some(1));
        assert_eq!(results[0].record_id, target);
    }

    #[tokio::test]
    async fn test_empty_query_is_not_a_zero_result() {
        let engine = engine_with(Arc::new(MockEmbedder::new(16)));
        engine.store("something", ContentType::Output, None).await.unwrap();

        assert!(engine.search(engine.query("")).await.unwrap().is_empty());
        assert!(engine.search(engine.query("   ")).await.unwrap().is_empty());

        let snapshot = engine.metrics();
        assert_eq!(snapshot.zero_results, 0);
        assert_eq!(snapshot.empty_queries, 2);
    }

    #[tokio::test]
    async fn test_no_match_counts_zero_results() {
        let engine = keyword_only_engine();
        engine.store("alpha beta", ContentType::Output, None).await.unwrap();

        assert!(engine.search(engine.query("gamma")).await.unwrap().is_empty());
        assert_eq!(engine.quality_metrics().zero_results(), 1);
    }

    #[tokio::test]
    async fn test_invalid_options_return_empty() {
        let engine = keyword_only_engine();
        engine.store("alpha", ContentType::Output, None).await.unwrap();

        let results = engine.search(engine.query("alpha").with_k(0)).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::Validation), 1);
    }

    #[tokio::test]
    async fn test_keyword_only_mode() {
        let engine = keyword_only_engine();
        engine
            .store("graceful degradation", ContentType::Decision, Some(0.8))
            .await
            .unwrap();

        let results = engine.search(engine.query("degradation")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].relevance_score - 0.8).abs() < 1e-9);
        assert!(!engine.diagnostics().await.unwrap().vector_index_available);
        assert_eq!(engine.metrics().searches[&QueryType::Keyword], 1);
    }

    #[tokio::test]
    async fn test_embedding_timeout_falls_back_to_keyword() {
        let engine = engine_with(Arc::new(SlowEmbedder));
        // Write path has no deadline, so seed the record directly.
        let record = MemoryRecord::new(ContentType::Code, "timeout handling code");
        engine.memory_store().insert_record(&record).unwrap();

        let query = engine
            .query("timeout handling")
            .with_timeout(Duration::from_millis(50));
        let results = engine.search(query).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, record.id);
        assert_eq!(results[0].vector_rank, None);
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::Embedding), 1);
    }

    #[tokio::test]
    async fn test_threshold_and_limit() {
        let engine = keyword_only_engine();
        for i in 0..4 {
            engine
                .store(format!("shared term {i}"), ContentType::Output, None)
                .await
                .unwrap();
        }

        let all = engine.search(engine.query("shared")).await.unwrap();
        assert_eq!(all.len(), 4);

        let limited = engine.search(engine.query("shared").with_limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);

        // Keep only rank 1 and 2: 1/61 and 1/62.
        let threshold = 1.0 / 62.0;
        let filtered = engine
            .search(engine.query("shared").with_relevance_threshold(threshold))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.combined_score >= threshold));
    }

    #[tokio::test]
    async fn test_search_updates_access_stats() {
        let engine = keyword_only_engine();
        let id = engine.store("frequently read", ContentType::Context, None).await.unwrap();
        engine.search(engine.query("frequently")).await.unwrap();

        // Bookkeeping is detached; wait for it.
        let mut count = 0;
        for _ in 0..50 {
            count = engine.get(id).await.unwrap().unwrap().access_count;
            if count > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_update_moves_partition() {
        let engine = engine_with(Arc::new(MockEmbedder::new(32)));
        let id = engine.store("lexer state machine", ContentType::Code, None).await.unwrap();

        let updated = engine
            .update(id, RecordUpdate::new().content_type(ContentType::Documentation))
            .await
            .unwrap();
        assert_eq!(updated.content_type, ContentType::Documentation);

        let docs = engine
            .search(
                engine
                    .query("lexer state machine")
                    .with_content_type(ContentType::Documentation),
            )
            .await
            .unwrap();
        assert_eq!(docs[0].record_id, id);
        assert_eq!(docs[0].vector_rank, Some(1));

        let code = engine
            .search(engine.query("lexer state machine").with_content_type(ContentType::Code))
            .await
            .unwrap();
        assert!(code.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let engine = keyword_only_engine();
        let err = engine
            .update(MemoryId::new(), RecordUpdate::new().content("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_input() {
        let engine = keyword_only_engine();
        assert!(matches!(
            engine.store("", ContentType::Code, None).await,
            Err(MemoryError::Validation(ValidationError::EmptyContent))
        ));
        assert!(engine.store("ok", ContentType::Code, Some(1.5)).await.is_err());
        assert_eq!(engine.diagnostics().await.unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn test_wrong_provider_dimensions_store_without_embedding() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        store.init_vectors(8, "other").unwrap();
        let engine = HybridSearchEngine::new(store, EngineConfig::default())
            .with_embedder(EmbeddingProvider::new(Arc::new(MockEmbedder::new(16))));

        let id = engine.store("mismatched", ContentType::Code, None).await.unwrap();
        assert!(!engine.get(id).await.unwrap().unwrap().has_embedding());
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::Embedding), 1);
    }

    #[tokio::test]
    async fn test_total_unavailability_is_error() {
        let engine = keyword_only_engine();
        engine.store("doomed", ContentType::Code, None).await.unwrap();
        engine
            .memory_store()
            .conn
            .lock()
            .execute_batch("DROP TABLE memory_fts")
            .unwrap();

        let err = engine.search(engine.query("doomed")).await.unwrap_err();
        assert!(matches!(err, MemoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_keyword_failure_falls_back_to_vector() {
        let engine = engine_with(Arc::new(MockEmbedder::new(32)));
        let id = engine.store("resilient lookup", ContentType::Code, None).await.unwrap();
        engine
            .memory_store()
            .conn
            .lock()
            .execute_batch("DROP TABLE memory_fts")
            .unwrap();

        let results = engine.search(engine.query("resilient lookup")).await.unwrap();
        assert_eq!(results[0].record_id, id);
        assert_eq!(results[0].keyword_rank, None);
        assert_eq!(engine.metrics().searches[&QueryType::Vector], 1);
    }

    #[tokio::test]
    async fn test_file_backed_store_uses_readers() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open(dir.path().join("memory.db")).unwrap());
        store.init_vectors(32, "mock").unwrap();
        let engine = HybridSearchEngine::new(store, EngineConfig::default())
            .with_embedder(EmbeddingProvider::new(Arc::new(MockEmbedder::new(32))));

        let id = engine
            .store("write ahead logging", ContentType::Learning, None)
            .await
            .unwrap();
        let results = engine.search(engine.query("write ahead logging")).await.unwrap();
        assert_eq!(results[0].record_id, id);
        assert!(results[0].found_by_both());
    }

    async fn file_backed_engine(dir: &tempfile::TempDir) -> (HybridSearchEngine, MemoryId) {
        let store = Arc::new(MemoryStore::open(dir.path().join("memory.db")).unwrap());
        store.init_vectors(32, "mock").unwrap();
        let engine = HybridSearchEngine::new(store, EngineConfig::default())
            .with_embedder(EmbeddingProvider::new(Arc::new(MockEmbedder::new(32))));
        let id = engine
            .store("checkpoint the write ahead log", ContentType::Learning, None)
            .await
            .unwrap();
        (engine, id)
    }

    /// Block one reader connection on another thread until `hold` has passed.
    fn hold_reader(
        store: Arc<MemoryStore>,
        keyword: bool,
        hold: Duration,
    ) -> std::thread::JoinHandle<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = if keyword {
                store.keyword_reader()
            } else {
                store.vector_reader()
            };
            tx.send(()).unwrap();
            std::thread::sleep(hold);
        });
        rx.recv().unwrap();
        holder
    }

    #[tokio::test]
    async fn test_lookup_deadline_keeps_vector_answer() {
        let dir = tempfile::TempDir::new().unwrap();
        let (engine, id) = file_backed_engine(&dir).await;
        let holder = hold_reader(Arc::clone(engine.memory_store()), true, Duration::from_millis(1500));

        let started = std::time::Instant::now();
        let query = engine
            .query("write ahead log")
            .with_timeout(Duration::from_millis(100));
        let results = engine.search(query).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(1200));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, id);
        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[0].keyword_rank, None);
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::KeywordSearch), 1);
        assert_eq!(engine.metrics().searches[&QueryType::Vector], 1);

        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_lookup_deadline_keeps_keyword_answer() {
        let dir = tempfile::TempDir::new().unwrap();
        let (engine, id) = file_backed_engine(&dir).await;
        let holder = hold_reader(Arc::clone(engine.memory_store()), false, Duration::from_millis(1500));

        let started = std::time::Instant::now();
        let query = engine
            .query("write ahead log")
            .with_timeout(Duration::from_millis(100));
        let results = engine.search(query).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(1200));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, id);
        assert_eq!(results[0].vector_rank, None);
        assert_eq!(results[0].keyword_rank, Some(1));
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::VectorSearch), 1);
        assert_eq!(engine.metrics().searches[&QueryType::Keyword], 1);

        holder.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_searches_and_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let (engine, _) = file_backed_engine(&dir).await;

        let mut ids = Vec::new();
        for i in 0..8 {
            let id = engine
                .store(&format!("shared note topic{i}"), ContentType::Context, None)
                .await
                .unwrap();
            ids.push(id);
        }
        let engine = Arc::new(engine);

        let mut searches = Vec::new();
        for round in 0..3 {
            for (i, id) in ids.iter().copied().enumerate() {
                let engine = Arc::clone(&engine);
                searches.push(tokio::spawn(async move {
                    let results = engine.search(engine.query(&format!("topic{i}"))).await.unwrap();
                    assert_eq!(results[0].record_id, id, "round {round} topic{i}");
                    assert!(results[0].found_by_both());
                }));
            }
        }
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .store(&format!("written during searches {i}"), ContentType::Output, None)
                        .await
                        .unwrap()
                })
            })
            .collect();

        for search in searches {
            search.await.unwrap();
        }
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(engine.metrics().total_searches, 24);
        assert_eq!(engine.quality_metrics().error_count(ErrorCategory::KeywordSearch), 0);
        let diagnostics = engine.diagnostics().await.unwrap();
        assert_eq!(diagnostics.total_records, 13);
        assert_eq!(diagnostics.keyword_index_size, 13);
        assert_eq!(diagnostics.vector_index_size, 13);
        assert!(engine.memory_store().check_consistency().unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_with_deadline() {
        let fast = with_deadline(Some(Instant::now() + Duration::from_secs(5)), async { 7 }).await;
        assert_eq!(fast, Some(7));

        let slow = with_deadline(
            Some(Instant::now() + Duration::from_millis(10)),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(slow.is_none());
    }
}
