//! Search request and result types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ContentType, MemoryId};
use crate::validation::ValidationError;

/// Default candidates requested from each index.
pub const DEFAULT_K: usize = 10;
/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;
/// Default weight of each fused method.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A hybrid search request.
///
/// Lowering `rrf_k` sharpens rank differences, raising `weight_vector`
/// favours semantic matches and raising `k` widens recall.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    /// Candidates requested from each index.
    pub k: usize,
    pub rrf_k: f64,
    pub weight_vector: f64,
    pub weight_keyword: f64,
    /// Restrict both lookups to one content type.
    pub content_type: Option<ContentType>,
    /// Drop fused results scoring below this.
    pub relevance_threshold: Option<f64>,
    /// Truncate the fused list.
    pub limit: Option<usize>,
    /// Deadline for the whole call.
    pub timeout: Option<Duration>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            k: DEFAULT_K,
            rrf_k: DEFAULT_RRF_K,
            weight_vector: DEFAULT_WEIGHT,
            weight_keyword: DEFAULT_WEIGHT,
            content_type: None,
            relevance_threshold: None,
            limit: None,
            timeout: None,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_rrf_k(mut self, rrf_k: f64) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    pub fn with_weights(mut self, weight_vector: f64, weight_keyword: f64) -> Self {
        self.weight_vector = weight_vector;
        self.weight_keyword = weight_keyword;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check text and numeric options.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if self.k == 0 {
            return Err(ValidationError::InvalidSearchOption {
                field: "k",
                reason: "must be greater than zero",
            });
        }
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(ValidationError::InvalidSearchOption {
                field: "rrf_k",
                reason: "must be a non-negative number",
            });
        }
        if !self.weight_vector.is_finite() || self.weight_vector < 0.0 {
            return Err(ValidationError::InvalidSearchOption {
                field: "weight_vector",
                reason: "must be a non-negative number",
            });
        }
        if !self.weight_keyword.is_finite() || self.weight_keyword < 0.0 {
            return Err(ValidationError::InvalidSearchOption {
                field: "weight_keyword",
                reason: "must be a non-negative number",
            });
        }
        if self.relevance_threshold.is_some_and(|t| t.is_nan()) {
            return Err(ValidationError::InvalidSearchOption {
                field: "relevance_threshold",
                reason: "must be a number",
            });
        }
        Ok(())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record_id: MemoryId,
    pub content: String,
    pub content_type: ContentType,
    /// 1-based rank in the vector list, if present there.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the keyword list, if present there.
    pub keyword_rank: Option<usize>,
    pub combined_score: f64,
    pub vector_distance: Option<f32>,
    pub keyword_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub relevance_score: f64,
}

impl SearchResult {
    /// Whether both retrieval methods surfaced this record.
    pub fn found_by_both(&self) -> bool {
        self.vector_rank.is_some() && self.keyword_rank.is_some()
    }
}
