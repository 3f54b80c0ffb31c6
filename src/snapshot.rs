//! Parallel-array memory snapshots.
//!
//! Memory managers commonly keep their working set as several independently
//! indexed collections (interactions, embeddings, timestamps, access counts,
//! concepts) plus an already-structured long-term list. [`MemorySnapshot`]
//! models that shape at the boundary and converts it to and from
//! [`MemorySet`], which is what the storage backends accept.
//!
//! Conversion to records is all-or-nothing: if the collections are not
//! index-aligned, or any value fails validation, no record is produced.

use crate::models::{
    DEFAULT_DECAY_FACTOR, LongTermRecord, MemorySet, ShortTermRecord, coerce_access_count,
};
use crate::{Error, Result};

/// The per-interaction fields a memory manager keeps in its primary list.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEntry {
    /// Interaction identifier.
    pub id: String,
    /// User prompt.
    pub prompt: String,
    /// Model output.
    pub output: String,
    /// Decay factor, when the manager has assigned one.
    pub decay_factor: Option<f64>,
}

impl InteractionEntry {
    /// Creates an entry without a decay factor.
    #[must_use]
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            output: output.into(),
            decay_factor: None,
        }
    }
}

/// A memory manager's in-process state, as parallel collections.
///
/// Index `i` of `short_term`, `embeddings`, `timestamps`, `access_counts`
/// and `concepts` together describe one short-term interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    /// Interaction id, prompt, output and optional decay factor.
    pub short_term: Vec<InteractionEntry>,
    /// Embedding per interaction, in the embedding model's precision.
    pub embeddings: Vec<Vec<f32>>,
    /// Creation time per interaction (Unix epoch seconds).
    pub timestamps: Vec<f64>,
    /// Retrieval counter per interaction.
    pub access_counts: Vec<f64>,
    /// Extracted concepts per interaction.
    pub concepts: Vec<Vec<String>>,
    /// Interactions already promoted to long-term memory.
    pub long_term: Vec<LongTermRecord>,
}

impl MemorySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one interaction to every parallel collection at once.
    pub fn push_interaction(
        &mut self,
        entry: InteractionEntry,
        embedding: Vec<f32>,
        timestamp: f64,
        concepts: Vec<String>,
    ) {
        self.short_term.push(entry);
        self.embeddings.push(embedding);
        self.timestamps.push(timestamp);
        self.access_counts.push(0.0);
        self.concepts.push(concepts);
    }

    /// Number of short-term interactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.short_term.len()
    }

    /// Returns true if the snapshot holds no interactions in either tier.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }

    /// Checks that every parallel collection has the same length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationMismatch`] listing every collection's
    /// length when they disagree.
    pub fn check_alignment(&self) -> Result<()> {
        let lengths = [
            ("interactions", self.short_term.len()),
            ("embeddings", self.embeddings.len()),
            ("timestamps", self.timestamps.len()),
            ("access_counts", self.access_counts.len()),
            ("concepts", self.concepts.len()),
        ];
        let expected = self.short_term.len();
        if lengths.iter().all(|(_, len)| *len == expected) {
            return Ok(());
        }

        let detail = lengths
            .iter()
            .map(|(name, len)| format!("{name}={len}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::SerializationMismatch(format!(
            "snapshot collections are not index-aligned ({detail})"
        )))
    }

    /// Flattens the snapshot into a validated memory set.
    ///
    /// Missing decay factors become [`DEFAULT_DECAY_FACTOR`], embeddings are
    /// widened to `f64`, and access counts must be integral.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationMismatch`] if the collections are not
    /// aligned or any resulting record is invalid.
    pub fn to_memory_set(&self) -> Result<MemorySet> {
        self.check_alignment()?;

        let short_term = self
            .short_term
            .iter()
            .zip(&self.embeddings)
            .zip(&self.timestamps)
            .zip(&self.access_counts)
            .zip(&self.concepts)
            .map(|((((entry, embedding), timestamp), access_count), concepts)| {
                let access_count = coerce_access_count(*access_count).map_err(|e| {
                    Error::SerializationMismatch(format!("interaction '{}': {e}", entry.id))
                })?;
                Ok(ShortTermRecord {
                    id: entry.id.clone(),
                    prompt: entry.prompt.clone(),
                    output: entry.output.clone(),
                    timestamp: *timestamp,
                    access_count,
                    decay_factor: entry.decay_factor.unwrap_or(DEFAULT_DECAY_FACTOR),
                    embedding: embedding.iter().copied().map(f64::from).collect(),
                    concepts: concepts.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let set = MemorySet::new(short_term, self.long_term.clone());
        set.validate()?;
        Ok(set)
    }

    /// Rebuilds the parallel-array shape from a memory set.
    ///
    /// Every decay factor is carried explicitly. Embeddings are narrowed back
    /// to `f32`, so this is lossy: an embedding saved with full `f64`
    /// precision comes back rounded to the nearest `f32`, and a component
    /// beyond the `f32` range becomes infinite. Use
    /// [`HistoryStore::load_history`](crate::storage::HistoryStore::load_history)
    /// when the stored precision matters.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_memory_set(set: &MemorySet) -> Self {
        let capacity = set.short_term.len();
        let mut snapshot = Self {
            short_term: Vec::with_capacity(capacity),
            embeddings: Vec::with_capacity(capacity),
            timestamps: Vec::with_capacity(capacity),
            access_counts: Vec::with_capacity(capacity),
            concepts: Vec::with_capacity(capacity),
            long_term: set.long_term.clone(),
        };

        for record in &set.short_term {
            snapshot.short_term.push(InteractionEntry {
                id: record.id.clone(),
                prompt: record.prompt.clone(),
                output: record.output.clone(),
                decay_factor: Some(record.decay_factor),
            });
            snapshot
                .embeddings
                .push(record.embedding.iter().map(|v| *v as f32).collect());
            snapshot.timestamps.push(record.timestamp);
            snapshot.access_counts.push(record.access_count as f64);
            snapshot.concepts.push(record.concepts.clone());
        }

        snapshot
    }
}

impl TryFrom<&MemorySnapshot> for MemorySet {
    type Error = Error;

    fn try_from(snapshot: &MemorySnapshot) -> Result<Self> {
        snapshot.to_memory_set()
    }
}

impl From<&MemorySet> for MemorySnapshot {
    fn from(set: &MemorySet) -> Self {
        Self::from_memory_set(set)
    }
}
