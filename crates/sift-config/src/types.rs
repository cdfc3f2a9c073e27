//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [database]               # where the memory database lives
//! [embedding]              # embedding provider
//! [embedding.openai]       # provider-specific settings
//! [vector]                 # vector index switch
//! [search]                 # default search options
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Database location.
    pub database: Option<DatabaseConfig>,

    /// Embedding provider configuration.
    pub embedding: Option<EmbeddingConfig>,

    /// Vector index configuration.
    pub vector: Option<VectorConfig>,

    /// Default search options.
    pub search: Option<SearchConfig>,
}

impl SiftConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale, not merged field by field.
    pub fn merge(&mut self, other: SiftConfig) {
        if other.database.is_some() {
            self.database = other.database;
        }

        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }

        if other.vector.is_some() {
            self.vector = other.vector;
        }

        if other.search.is_some() {
            self.search = other.search;
        }
    }

    /// Database section, or defaults.
    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }

    /// Embedding section, or defaults.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Vector section, or defaults.
    pub fn vector(&self) -> VectorConfig {
        self.vector.clone().unwrap_or_default()
    }

    /// Search section, or defaults.
    pub fn search(&self) -> SearchConfig {
        self.search.clone().unwrap_or_default()
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref search) = self.search {
            search.validate()?;
        }
        if let Some(ref embedding) = self.embedding {
            embedding.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Database location.
///
/// ```toml
/// [database]
/// path = "~/.local/share/sift/memory.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `~/` is expanded; unset means the platform data dir.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolve the configured path to an absolute location.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => expand_home(path),
            None => dirs::data_dir()
                .map(|d| d.join("sift").join("memory.db"))
                .unwrap_or_else(|| PathBuf::from("sift-memory.db")),
        }
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "openai"
/// dimensions = 768
///
/// [embedding.openai]
/// model = "text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "openai" or "mock".
    pub provider: EmbeddingProvider,
    /// Output embedding dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// Characters kept per text before embedding.
    pub max_input_chars: usize,
    /// Request timeout for network providers, in seconds.
    pub timeout_secs: u64,
    /// OpenAI-specific embedding settings.
    pub openai: Option<EmbeddingOpenAiConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Mock,
            dimensions: None,
            max_input_chars: 8000,
            timeout_secs: 30,
            openai: None,
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::OpenAi => {
                let openai = self.openai.clone().unwrap_or_default();
                openai.dimensions.unwrap_or(match openai.model.as_str() {
                    "text-embedding-3-large" => 3072,
                    _ => 1536,
                })
            }
            EmbeddingProvider::Mock => 768,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.dimensions == Some(0) {
            return Err(ConfigError::Invalid {
                field: "embedding.dimensions".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.max_input_chars".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible embeddings API.
    OpenAi,
    /// Deterministic offline embedder.
    Mock,
}

impl EmbeddingProvider {
    /// Name understood by the embedder factory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

/// OpenAI embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    /// Model name. Default: "text-embedding-3-small".
    pub model: String,
    /// Override dimensions (OpenAI supports reduced output).
    pub dimensions: Option<usize>,
    /// Custom base URL (for proxies and compatible servers).
    pub base_url: Option<String>,
    /// API key (prefer the OPENAI_API_KEY env var).
    pub api_key: Option<String>,
}

impl Default for EmbeddingOpenAiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            base_url: None,
            api_key: None,
        }
    }
}

impl EmbeddingOpenAiConfig {
    /// API key from config, falling back to `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Vector index switch.
///
/// ```toml
/// [vector]
/// enabled = false   # keyword-only mode
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Whether the vector index is used at all.
    pub enabled: bool,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default options applied to every search.
///
/// ```toml
/// [search]
/// k = 10
/// rrf_k = 60.0
/// weight_vector = 1.0
/// weight_keyword = 1.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates requested from each index.
    pub k: usize,
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Weight of the vector term.
    pub weight_vector: f64,
    /// Weight of the keyword term.
    pub weight_keyword: f64,
    /// Drop fused results scoring below this.
    pub relevance_threshold: Option<f64>,
    /// Per-search deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// How many top results the diversity metric looks at.
    pub diversity_top_n: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: 10,
            rrf_k: 60.0,
            weight_vector: 1.0,
            weight_keyword: 1.0,
            relevance_threshold: None,
            timeout_ms: None,
            diversity_top_n: 5,
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: format!("search.{field}"),
            reason: reason.to_string(),
        };

        if self.k == 0 {
            return Err(invalid("k", "must be greater than zero"));
        }
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(invalid("rrf_k", "must be a non-negative number"));
        }
        if !self.weight_vector.is_finite() || self.weight_vector < 0.0 {
            return Err(invalid("weight_vector", "must be a non-negative number"));
        }
        if !self.weight_keyword.is_finite() || self.weight_keyword < 0.0 {
            return Err(invalid("weight_keyword", "must be a non-negative number"));
        }
        if self.diversity_top_n == 0 {
            return Err(invalid("diversity_top_n", "must be greater than zero"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
