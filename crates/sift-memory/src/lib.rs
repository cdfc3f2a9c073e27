//! Hybrid memory search for sift.
//!
//! Records live in one SQLite file. Every write is projected into two
//! secondary indexes inside the same transaction: a sqlite-vec `vec0` table
//! partitioned by content type, and an FTS5 table. Searches query both and
//! merge the ranked lists with Reciprocal Rank Fusion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HybridSearchEngine (async)                                             │
//! │  - embeds content and queries through EmbeddingProvider                 │
//! │  - runs vector + keyword lookups concurrently, fuses with RRF           │
//! │  - records QualityMetrics and errors                                    │
//! └──────────────────────────────┬──────────────────────────────────────────┘
//!                                │ spawn_blocking
//! ┌──────────────────────────────▼──────────────────────────────────────────┐
//! │  MemoryStore (sync)                                                     │
//! │  - memories table (source of truth), WAL mode                           │
//! │  - IndexSynchronizer keeps memory_vectors and memory_fts in step        │
//! │  - separate read connections for vector and keyword lookups             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sift_embed::MockEmbedder;
//! use sift_memory::{ContentType, EmbeddingProvider, EngineConfig, HybridSearchEngine, MemoryStore};
//!
//! # async fn run() -> sift_memory::Result<()> {
//! let store = Arc::new(MemoryStore::open("memory.db")?);
//! store.init_vectors(768, "mock")?;
//!
//! let engine = HybridSearchEngine::new(store, EngineConfig::default())
//!     .with_embedder(EmbeddingProvider::new(Arc::new(MockEmbedder::new(768))));
//!
//! engine.store("WAL mode lets readers run during writes", ContentType::Learning, None).await?;
//! let results = engine.search(engine.query("concurrent readers")).await?;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod keyword;
pub mod metrics;
pub mod search;
pub mod store;
pub mod sync;
pub mod types;
pub mod validation;
pub mod vector;

// Re-export error types
pub use error::{MemoryError, Result};

// Re-export store
pub use store::{
    ConsistencyReport, Diagnostics, MemoryStore, ReindexDryRun, ReindexReport, StoreStats,
};

// Re-export types
pub use types::{ContentType, DEFAULT_RELEVANCE_SCORE, MemoryId, MemoryRecord, RecordUpdate};

// Re-export validation
pub use validation::{
    ValidationError, validate_content, validate_embedding, validate_record,
    validate_relevance_score,
};

// Re-export indexes
pub use keyword::KeywordHit;
pub use sync::IndexSynchronizer;
pub use vector::VectorHit;

// Re-export engine
pub use embedding::{EmbeddingFailure, EmbeddingProvider};
pub use metrics::{
    ErrorCategory, ErrorCount, ErrorEvent, HistogramSnapshot, MetricsSnapshot, QualityMetrics,
    QueryType, Severity,
};
pub use search::{EngineConfig, HybridSearchEngine, SearchQuery, SearchResult};
