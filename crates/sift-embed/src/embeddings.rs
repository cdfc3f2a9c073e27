//! Embedding support for semantic search.
//!
//! This module provides the [`Embedder`] trait and the implementations that
//! turn text into dense vectors for the memory engine's vector index.
//!
//! # Implementations
//!
//! - [`MockEmbedder`]: Deterministic, offline embeddings for tests and demos
//! - [`OpenAiEmbedder`]: OpenAI-compatible `/embeddings` HTTP API

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EmbedError, Result};

/// Default cap on characters sent to a provider per text.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
///
/// Implementations must return vectors of exactly [`Embedder::dimensions`]
/// entries. Callers treat every error as "no embedding available".
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Get the name of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

/// Truncate text to at most `max_chars` characters.
///
/// Cuts on a char boundary, so the same input always yields the same prefix.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic embedder that needs no model.
///
/// Each lowercase word contributes a pseudo-random direction seeded by its
/// hash, and the sum is normalised to unit length. Texts that share words end
/// up close together, identical texts produce identical vectors.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    max_input_chars: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Create a mock embedder with 768 dimensions.
    pub fn default_dimensions() -> Self {
        Self::new(768)
    }

    fn accumulate(&self, seed: u64, embedding: &mut [f32]) {
        let mut state = seed;
        for value in embedding.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *value += ((state >> 33) as f32 / (1u64 << 30) as f32) - 1.0;
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::default_dimensions()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_input(text, self.max_input_chars);
        let mut embedding = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .peekable();

        if tokens.peek().is_none() {
            self.accumulate(simple_hash(text), &mut embedding);
        } else {
            for token in tokens {
                self.accumulate(simple_hash(token), &mut embedding);
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// djb2 hash, stable across runs and platforms.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

use reqwest::Client;
use std::time::Duration;

/// Configuration for OpenAI-compatible embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model to use for embeddings.
    pub model: String,
    /// Requested output dimensions (text-embedding-3 models support shortening).
    pub dimensions: Option<usize>,
    /// Request timeout.
    pub timeout: Duration,
    /// Characters kept per input before the request is built.
    pub max_input_chars: usize,
}

impl OpenAiEmbedderConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(30),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Create config from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbedError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request shortened output vectors.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-input character cap.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config.dimensions.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    /// Create from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiEmbedderConfig::from_env()?)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Internal("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts
                .iter()
                .map(|s| truncate_input(s, self.config.max_input_chars).to_string())
                .collect(),
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Serialization(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(EmbedError::Serialization(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct order
        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        debug!(count = embeddings.len(), model = %self.config.model, "Generated embeddings");
        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of the embedder to build.
///
/// The binary fills this from its configuration so that this crate does not
/// depend on sift-config.
#[derive(Debug, Clone)]
pub struct EmbedderSpec {
    /// Provider name: "openai" or "mock".
    pub provider: String,
    /// OpenAI API key (required for "openai").
    pub openai_api_key: Option<String>,
    /// OpenAI model name.
    pub openai_model: Option<String>,
    /// OpenAI base URL override.
    pub openai_base_url: Option<String>,
    /// Requested dimensions.
    pub dimensions: Option<usize>,
    /// Per-input character cap.
    pub max_input_chars: usize,
    /// Request timeout for network providers.
    pub timeout: Duration,
}

impl Default for EmbedderSpec {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            openai_api_key: None,
            openai_model: None,
            openai_base_url: None,
            dimensions: None,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Build a [`SharedEmbedder`] from a spec.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "openai" => {
            let api_key = spec.openai_api_key.as_deref().ok_or_else(|| {
                EmbedError::Config(
                    "OpenAI embedding provider requires an API key. \
                     Set OPENAI_API_KEY or configure [embedding.openai] api_key."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key)
                .with_timeout(spec.timeout)
                .with_max_input_chars(spec.max_input_chars);
            if let Some(ref model) = spec.openai_model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.openai_base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(dims) = spec.dimensions {
                config = config.with_dimensions(dims);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        "mock" => {
            let mut embedder = MockEmbedder::new(spec.dimensions.unwrap_or(768));
            embedder.max_input_chars = spec.max_input_chars;
            Ok(Arc::new(embedder))
        }
        other => Err(EmbedError::Config(format!(
            "Unknown embedding provider '{}'. Valid: openai, mock",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate cosine similarity between two embeddings.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
