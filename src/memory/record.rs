//! Memory Record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted experience: what was asked, how it went, and where it sits in embedding space.
///
/// Records are immutable once stored. The store only ever appends them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Unique identifier
    pub id: String,
    /// The objective text this record was created for
    pub objective: String,
    /// Embedding of the objective text
    pub embedding: Vec<f32>,
    /// Summary of the run outcome
    pub outcome_summary: String,
    /// Whether the run reached its objective
    pub success: bool,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// Strategy and outcome labels
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryRecord {
    pub fn new(
        objective: impl Into<String>,
        embedding: Vec<f32>,
        outcome_summary: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            objective: objective.into(),
            embedding,
            outcome_summary: outcome_summary.into(),
            success,
            created_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Override the creation time (imports and tests)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A record paired with its similarity to the query
pub type ScoredRecord = (MemoryRecord, f32);
