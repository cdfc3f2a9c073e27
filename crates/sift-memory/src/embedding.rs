//! Best-effort embedding for the engine.
//!
//! Wraps a [`SharedEmbedder`] and turns every way it can go wrong into an
//! [`EmbeddingFailure`]. Callers degrade to "no embedding" on failure; an
//! embedding problem never fails a store or search call.

use sift_embed::{EmbedError, SharedEmbedder, truncate_input};
use tracing::debug;

use crate::validation::{ValidationError, validate_embedding};

/// Why no embedding was produced.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingFailure {
    /// Nothing to embed.
    #[error("empty input")]
    EmptyInput,

    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] EmbedError),

    /// The provider returned a malformed vector.
    #[error("invalid embedding: {0}")]
    Invalid(#[from] ValidationError),
}

/// Embedding source with a fixed output dimensionality.
#[derive(Clone)]
pub struct EmbeddingProvider {
    embedder: SharedEmbedder,
    dimensions: usize,
    max_input_chars: usize,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("name", &self.embedder.name())
            .field("dimensions", &self.dimensions)
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

impl EmbeddingProvider {
    /// Wrap an embedder, taking the deployment dimensionality from it.
    pub fn new(embedder: SharedEmbedder) -> Self {
        let dimensions = embedder.dimensions();
        Self {
            embedder,
            dimensions,
            max_input_chars: sift_embed::DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Override the deployment dimensionality.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set how many characters are kept before embedding.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Output dimensionality every embedding is checked against.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Name of the underlying embedder.
    pub fn name(&self) -> &str {
        self.embedder.name()
    }

    /// The wrapped embedder, for batch work such as reindexing.
    pub fn embedder(&self) -> &SharedEmbedder {
        &self.embedder
    }

    /// Embed text, truncating it deterministically first.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        let input = truncate_input(text.trim(), self.max_input_chars);
        if input.is_empty() {
            return Err(EmbeddingFailure::EmptyInput);
        }
        if input.len() < text.trim().len() {
            debug!(kept = self.max_input_chars, "embedding input truncated");
        }

        let embedding = self.embedder.embed(input).await?;
        validate_embedding(&embedding, self.dimensions)?;
        Ok(embedding)
    }
}
