//! CLI command handlers.

pub mod maintenance;
pub mod record;
pub mod search;
pub mod stats;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use sift_config::{EmbeddingConfig, SearchConfig, SiftConfig};
use sift_memory::{ContentType, EmbeddingProvider, EngineConfig, HybridSearchEngine, MemoryStore};
use tracing::{debug, warn};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Database path from `--database`.
    pub database: Option<PathBuf>,
    /// Vector index disabled from the command line.
    pub keyword_only: bool,
}

impl Context {
    /// Load layered configuration, logging any warnings.
    pub fn load_config(&self) -> Result<SiftConfig> {
        let loaded = sift_config::load_config(None).context("Failed to load configuration")?;
        for warning in &loaded.warnings {
            warn!("{warning}");
        }
        debug!(sources = ?loaded.loaded_from(), "configuration loaded");
        Ok(loaded.config)
    }

    /// Whether the vector index should be used.
    pub fn vectors_enabled(&self, config: &SiftConfig) -> bool {
        !self.keyword_only && config.vector().enabled
    }

    /// Open the store, initialising vectors unless disabled.
    pub fn open_store(&self, config: &SiftConfig) -> Result<Arc<MemoryStore>> {
        let path = self
            .database
            .clone()
            .unwrap_or_else(|| config.database().resolved_path());
        let store = MemoryStore::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        if self.vectors_enabled(config) {
            let embedding = config.embedding();
            store.init_vectors(embedding.effective_dimensions(), embedding.provider.as_str())?;
            if store.vectors_stale() {
                warn!("stored vectors don't match the configured embedding; run `sift reindex`");
            }
        }
        Ok(Arc::new(store))
    }

    /// Open the store and wrap it in a search engine.
    pub fn open_engine(&self) -> Result<HybridSearchEngine> {
        let config = self.load_config()?;
        let store = self.open_store(&config)?;
        let mut engine = HybridSearchEngine::new(store, engine_config(&config.search()));

        if self.vectors_enabled(&config) {
            let embedding = config.embedding();
            let embedder = sift_embed::build_embedder(&build_embedder_spec(&embedding))
                .map_err(|e| anyhow::anyhow!("Failed to build embedder: {e}"))?;
            engine = engine.with_embedder(
                EmbeddingProvider::new(embedder)
                    .with_dimensions(embedding.effective_dimensions())
                    .with_max_input_chars(embedding.max_input_chars),
            );
        }
        Ok(engine)
    }
}

/// Engine defaults from the `[search]` section.
pub fn engine_config(search: &SearchConfig) -> EngineConfig {
    EngineConfig {
        k: search.k,
        rrf_k: search.rrf_k,
        weight_vector: search.weight_vector,
        weight_keyword: search.weight_keyword,
        relevance_threshold: search.relevance_threshold,
        timeout: search.timeout_ms.map(Duration::from_millis),
        diversity_top_n: search.diversity_top_n,
    }
}

/// Build an EmbedderSpec from the `[embedding]` section.
pub fn build_embedder_spec(config: &EmbeddingConfig) -> sift_embed::EmbedderSpec {
    let openai_config = config.openai.as_ref();

    sift_embed::EmbedderSpec {
        provider: config.provider.as_str().to_string(),
        openai_api_key: openai_config
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        openai_model: openai_config.map(|c| c.model.clone()),
        openai_base_url: openai_config.and_then(|c| c.base_url.clone()),
        dimensions: config
            .dimensions
            .or_else(|| openai_config.and_then(|c| c.dimensions)),
        max_input_chars: config.max_input_chars,
        timeout: Duration::from_secs(config.timeout_secs),
    }
}

/// clap value parser for content types.
pub fn parse_content_type(s: &str) -> std::result::Result<ContentType, String> {
    s.parse::<ContentType>().map_err(|_| {
        let valid: Vec<&str> = ContentType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown content type '{s}' (valid: {})", valid.join(", "))
    })
}

/// Single-line preview of `s`, at most `max_chars` characters.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
