//! Interaction records and memory sets.

use super::validation::validate_history;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Decay factor applied when a snapshot does not carry one (no decay).
pub const DEFAULT_DECAY_FACTOR: f64 = 1.0;

const fn default_decay_factor() -> f64 {
    DEFAULT_DECAY_FACTOR
}

/// A recent interaction kept with full detail for relevance retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortTermRecord {
    /// Identifier, unique within the short-term sequence of its set.
    pub id: String,
    /// User prompt.
    pub prompt: String,
    /// Model output.
    pub output: String,
    /// Creation time (Unix epoch seconds).
    pub timestamp: f64,
    /// Number of retrieval hits, incremented by the memory manager.
    pub access_count: u64,
    /// Weight multiplier in (0, 1].
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Embedding of `prompt + output`.
    pub embedding: Vec<f64>,
    /// Extracted concepts. Duplicates are allowed.
    pub concepts: Vec<String>,
}

impl ShortTermRecord {
    /// Creates a record with no embedding, no concepts, zero accesses and no
    /// decay.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        output: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            output: output.into(),
            timestamp,
            access_count: 0,
            decay_factor: DEFAULT_DECAY_FACTOR,
            embedding: Vec::new(),
            concepts: Vec::new(),
        }
    }

    /// Sets the embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Sets the concepts.
    #[must_use]
    pub fn with_concepts(mut self, concepts: Vec<String>) -> Self {
        self.concepts = concepts;
        self
    }

    /// Sets the access count.
    #[must_use]
    pub fn with_access_count(mut self, access_count: u64) -> Self {
        self.access_count = access_count;
        self
    }

    /// Sets the decay factor.
    #[must_use]
    pub fn with_decay_factor(mut self, decay_factor: f64) -> Self {
        self.decay_factor = decay_factor;
        self
    }
}

/// An interaction promoted out of the active working set.
///
/// Carries a combined score instead of an embedding and concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermRecord {
    /// Identifier, unique within the long-term sequence of its set.
    pub id: String,
    /// User prompt.
    pub prompt: String,
    /// Model output.
    pub output: String,
    /// Creation time (Unix epoch seconds).
    pub timestamp: f64,
    /// Number of retrieval hits.
    pub access_count: u64,
    /// Weight multiplier in (0, 1].
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Combined relevance, recency and importance score.
    pub total_score: f64,
}

/// The complete memory of one identity.
///
/// Persistence always replaces a whole set; records are never merged with a
/// previously stored version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySet {
    /// Short-term records, in the caller's order.
    #[serde(rename = "shortTermMemory")]
    pub short_term: Vec<ShortTermRecord>,
    /// Long-term records, in the caller's order.
    #[serde(rename = "longTermMemory")]
    pub long_term: Vec<LongTermRecord>,
}

impl MemorySet {
    /// Creates a memory set from its two sequences.
    #[must_use]
    pub const fn new(short_term: Vec<ShortTermRecord>, long_term: Vec<LongTermRecord>) -> Self {
        Self {
            short_term,
            long_term,
        }
    }

    /// Returns true if both sequences are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }

    /// Total number of records across both tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.short_term.len() + self.long_term.len()
    }

    /// Embedding length shared by the short-term records, if any exist.
    #[must_use]
    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.short_term.first().map(|record| record.embedding.len())
    }

    /// Checks every record and set-level invariant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SerializationMismatch`] describing the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        validate_history(&self.short_term, &self.long_term)
    }

    /// Splits the set into its short-term and long-term sequences.
    #[must_use]
    pub fn into_parts(self) -> (Vec<ShortTermRecord>, Vec<LongTermRecord>) {
        (self.short_term, self.long_term)
    }
}
