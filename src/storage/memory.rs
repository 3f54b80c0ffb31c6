//! In-memory history store.
//!
//! Process-local implementation of [`HistoryStore`] with no I/O. Serves as
//! the behavioral reference for the durable backends and as a test double for
//! memory managers.

use crate::models::{LongTermRecord, MemorySet, SetId, ShortTermRecord, validate_history};
use crate::storage::traits::HistoryStore;
use crate::Result;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::instrument;

/// In-memory history store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust,ignore
/// use memvault::{HistoryStore, InMemoryHistoryStore, SetId};
///
/// let store = InMemoryHistoryStore::new();
/// let history = store.load_history(&SetId::new("nobody")?)?;
/// assert!(history.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    sets: RwLock<HashMap<SetId, MemorySet>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of memory sets stored.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.read_sets().len()
    }

    /// Returns true if a memory set has been saved for `set_id`.
    #[must_use]
    pub fn contains(&self, set_id: &SetId) -> bool {
        self.read_sets().contains_key(set_id)
    }

    fn read_sets(&self) -> RwLockReadGuard<'_, HashMap<SetId, MemorySet>> {
        self.sets.read().unwrap_or_else(|poisoned| {
            tracing::warn!("In-memory history lock was poisoned, recovering");
            metrics::counter!("memvault_memory_lock_poison_recovery_total").increment(1);
            poisoned.into_inner()
        })
    }

    fn write_sets(&self) -> RwLockWriteGuard<'_, HashMap<SetId, MemorySet>> {
        self.sets.write().unwrap_or_else(|poisoned| {
            tracing::warn!("In-memory history lock was poisoned, recovering");
            metrics::counter!("memvault_memory_lock_poison_recovery_total").increment(1);
            poisoned.into_inner()
        })
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self), fields(backend = "memory", set_id = %set_id))]
    fn load_history(&self, set_id: &SetId) -> Result<MemorySet> {
        // Clone so callers never alias the stored set.
        let set = self.read_sets().get(set_id).cloned().unwrap_or_default();
        tracing::debug!(
            short_term = set.short_term.len(),
            long_term = set.long_term.len(),
            "Loaded interaction history"
        );
        metrics::counter!("memvault_history_loads_total", "backend" => "memory").increment(1);
        Ok(set)
    }

    #[instrument(
        skip(self, short_term, long_term),
        fields(backend = "memory", set_id = %set_id)
    )]
    fn save_history(
        &self,
        set_id: &SetId,
        short_term: &[ShortTermRecord],
        long_term: &[LongTermRecord],
    ) -> Result<()> {
        if let Err(e) = validate_history(short_term, long_term) {
            metrics::counter!(
                "memvault_history_failures_total",
                "backend" => "memory",
                "operation" => "save"
            )
            .increment(1);
            return Err(e);
        }

        let set = MemorySet::new(short_term.to_vec(), long_term.to_vec());
        self.write_sets().insert(set_id.clone(), set);
        tracing::info!(
            short_term = short_term.len(),
            long_term = long_term.len(),
            "Saved interaction history"
        );
        metrics::counter!("memvault_history_saves_total", "backend" => "memory").increment(1);
        Ok(())
    }
}
