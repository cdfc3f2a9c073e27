//! Validation for records, embeddings and search options.
//!
//! Write paths surface these as [`MemoryError::Validation`]; the search path
//! records them with the error tracker and returns an empty result instead.

use crate::error::{MemoryError, Result};
use crate::types::MemoryRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Record content is empty or whitespace.
    #[error("memory content is empty")]
    EmptyContent,

    /// Relevance score is outside `[0.0, 1.0]`.
    #[error("relevance score {0} is out of range [0.0, 1.0]")]
    InvalidRelevance(f64),

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues {
        /// Number of invalid values found.
        count: usize,
    },

    /// Search text is empty or whitespace.
    #[error("search query is empty")]
    EmptyQuery,

    /// A search option is out of range.
    #[error("invalid search option '{field}': {reason}")]
    InvalidSearchOption {
        field: &'static str,
        reason: &'static str,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate an embedding vector.
///
/// Checks the dimension first, then for NaN or Inf values.
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: usize,
) -> std::result::Result<(), ValidationError> {
    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Record Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate record content.
pub fn validate_content(content: &str) -> std::result::Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(())
}

/// Validate a relevance score is within `[0.0, 1.0]`.
pub fn validate_relevance_score(score: f64) -> std::result::Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&score) {
        return Err(ValidationError::InvalidRelevance(score));
    }
    Ok(())
}

/// Validate a record before it is written.
///
/// Embedding dimensions are checked later by the index synchronizer, which
/// knows the deployment dimensionality.
pub fn validate_record(record: &MemoryRecord) -> Result<()> {
    validate_content(&record.content)?;
    validate_relevance_score(record.relevance_score)?;
    if let Some(ref embedding) = record.embedding {
        let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
        if invalid_count > 0 {
            return Err(MemoryError::Validation(
                ValidationError::InvalidEmbeddingValues {
                    count: invalid_count,
                },
            ));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
