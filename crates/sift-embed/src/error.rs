//! Error types for the embedding crate.

use thiserror::Error;

/// Result type alias using the embedding error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider answered with a non-success status.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The provider could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider response could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller passed something the provider cannot embed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbedError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            EmbedError::Network(format!("Connection failed: {}", err))
        } else {
            EmbedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::Serialization(err.to_string())
    }
}

impl EmbedError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedError::Network(_) | EmbedError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::Network("down".into()).is_transient());
        assert!(EmbedError::Backend("HTTP 503".into()).is_transient());
        assert!(!EmbedError::Config("no key".into()).is_transient());
        assert!(!EmbedError::Serialization("bad json".into()).is_transient());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: EmbedError = err.into();
        assert!(matches!(converted, EmbedError::Serialization(_)));
    }
}
