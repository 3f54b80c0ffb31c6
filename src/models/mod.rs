//! Data models for memvault.
//!
//! Record types for the two memory tiers, the memory set that owns them, and
//! the validation rules a set must satisfy before it is persisted.

mod history;
mod set_id;
mod validation;

pub use history::{DEFAULT_DECAY_FACTOR, LongTermRecord, MemorySet, ShortTermRecord};
pub use set_id::SetId;
pub use validation::{coerce_access_count, validate_history};
