//! Error types for the memory crate.

use thiserror::Error;

use crate::metrics::ErrorCategory;
use crate::validation::ValidationError;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid query or parameters.
    #[error("Query error: {0}")]
    Query(String),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Invalid UUID format.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An index is unavailable; for searches, both indexes are.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A blocking task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

impl MemoryError {
    /// The error-tracker category this error is counted under.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Query(_) | Self::NotFound(_) | Self::InvalidUuid(_) | Self::Validation(_) => {
                ErrorCategory::Validation
            }
            Self::Unavailable(_) => ErrorCategory::KeywordSearch,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Migration(_)
            | Self::InvalidData(_)
            | Self::Task(_) => ErrorCategory::Database,
        }
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
