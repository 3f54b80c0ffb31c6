//! History store trait.

use crate::models::{LongTermRecord, MemorySet, SetId, ShortTermRecord};
use crate::snapshot::MemorySnapshot;
use crate::Result;

/// Trait for memory set persistence backends.
///
/// A backend keeps at most one version of each memory set. Saves replace the
/// stored set wholesale and never merge with earlier content. Concurrent saves
/// for the same set id race and the last writer wins; loads may run
/// concurrently with each other and with a save, and observe either the
/// previous or the new set, never a mix.
pub trait HistoryStore: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Loads the memory set for `set_id`.
    ///
    /// An unknown set id is not an error: an empty [`MemorySet`] is returned.
    fn load_history(&self, set_id: &SetId) -> Result<MemorySet>;

    /// Replaces the persisted memory set for `set_id`.
    ///
    /// The records are validated before anything is written; a rejected save
    /// leaves the previously persisted set untouched.
    fn save_history(
        &self,
        set_id: &SetId,
        short_term: &[ShortTermRecord],
        long_term: &[LongTermRecord],
    ) -> Result<()>;

    /// Replaces the persisted memory set with `set`.
    fn save_set(&self, set_id: &SetId, set: &MemorySet) -> Result<()> {
        self.save_history(set_id, &set.short_term, &set.long_term)
    }

    /// Flattens a parallel-array snapshot and saves it.
    ///
    /// Fails with [`crate::Error::SerializationMismatch`] before any write if
    /// the snapshot's collections are not index-aligned.
    fn save_snapshot(&self, set_id: &SetId, snapshot: &MemorySnapshot) -> Result<()> {
        let set = snapshot.to_memory_set()?;
        self.save_set(set_id, &set)
    }

    /// Loads a memory set in parallel-array form.
    ///
    /// Embeddings are narrowed to `f32` on the way out, so values saved with
    /// [`Self::save_history`] at full `f64` precision do not survive exactly.
    /// Snapshots saved with [`Self::save_snapshot`] round-trip unchanged.
    fn load_snapshot(&self, set_id: &SetId) -> Result<MemorySnapshot> {
        let set = self.load_history(set_id)?;
        Ok(MemorySnapshot::from_memory_set(&set))
    }
}
