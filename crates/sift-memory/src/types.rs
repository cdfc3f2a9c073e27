//! Core data types: record identifiers, content types and memory records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MemoryError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// ID Types
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(Uuid);

impl MemoryId {
    /// Create a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the hyphenated string form stored in the database.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content Type
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of content a record holds.
///
/// Also the partition key of the vector index, so a filtered k-NN query only
/// visits vectors of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    Documentation,
    Context,
    Decision,
    Learning,
    Output,
    Error,
}

impl ContentType {
    /// Every content type, in declaration order.
    pub const ALL: [ContentType; 7] = [
        Self::Code,
        Self::Documentation,
        Self::Context,
        Self::Decision,
        Self::Learning,
        Self::Output,
        Self::Error,
    ];

    /// Stable string form used in the database and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Documentation => "documentation",
            Self::Context => "context",
            Self::Decision => "decision",
            Self::Learning => "learning",
            Self::Output => "output",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "documentation" | "docs" => Ok(Self::Documentation),
            "context" => Ok(Self::Context),
            "decision" => Ok(Self::Decision),
            "learning" => Ok(Self::Learning),
            "output" => Ok(Self::Output),
            "error" => Ok(Self::Error),
            other => Err(MemoryError::InvalidData(format!(
                "unknown content type '{other}'"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Record
// ─────────────────────────────────────────────────────────────────────────────

/// Prior weight given to records stored without an explicit relevance score.
pub const DEFAULT_RELEVANCE_SCORE: f64 = 0.5;

/// A stored unit of knowledge.
///
/// The `memories` table is the source of truth; the keyword and vector
/// indexes are projections of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    pub content_type: ContentType,
    /// Absent when embedding generation failed or was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Caller-assigned prior weight in `[0, 1]`; not used for ranking.
    pub relevance_score: f64,
    pub access_count: u32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record with a fresh ID and timestamps.
    pub fn new(content_type: ContentType, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            content: content.into(),
            content_type,
            embedding: None,
            relevance_score: DEFAULT_RELEVANCE_SCORE,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the relevance prior.
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Override the creation time (also resets `updated_at`).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Whether the record carries an embedding.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Field changes for [`crate::HybridSearchEngine::update`].
///
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub content: Option<String>,
    pub content_type: Option<ContentType>,
    pub relevance_score: Option<f64>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.content_type.is_none() && self.relevance_score.is_none()
    }

    /// Whether applying this update changes the text and so needs a new embedding.
    pub fn changes_content(&self, record: &MemoryRecord) -> bool {
        self.content
            .as_deref()
            .is_some_and(|content| content != record.content)
    }

    /// Apply the changes to a record, bumping `updated_at`.
    pub fn apply(&self, record: &mut MemoryRecord) {
        if let Some(ref content) = self.content {
            record.content = content.clone();
        }
        if let Some(content_type) = self.content_type {
            record.content_type = content_type;
        }
        if let Some(score) = self.relevance_score {
            record.relevance_score = score;
        }
        record.updated_at = Utc::now();
    }
}
