//! Embedding providers for sift.
//!
//! The engine treats the embedding model as an external black box: text goes
//! in, a fixed-dimension vector (or an error) comes out. This crate holds the
//! [`Embedder`] trait that every provider implements, plus the providers that
//! ship with sift:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Embedder trait                          │
//! │  - embed(text) -> Vec<f32>               │
//! │  - embed_batch(texts) -> Vec<Vec<f32>>   │
//! └──────────────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!    ┌────────────┐     ┌──────────────┐
//!    │ MockEmbedder│     │ OpenAiEmbedder│
//!    └────────────┘     └──────────────┘
//! ```

pub mod embeddings;
pub mod error;

pub use embeddings::{
    DEFAULT_MAX_INPUT_CHARS, Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedEmbedder, build_embedder, cosine_similarity, truncate_input,
};
pub use error::{EmbedError, Result};
