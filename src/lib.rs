//! # Memvault
//!
//! Persistent interaction memory for conversational agents.
//!
//! Memvault stores, per identity, the short-term interactions an agent is
//! actively reasoning over (with embeddings and extracted concepts) and the
//! long-term interactions that were promoted out of the working set (with a
//! combined relevance score). Each identity's memory is one *memory set*,
//! addressed by an opaque [`SetId`] and persisted as a whole.
//!
//! ## Features
//!
//! - Typed, validated records ([`ShortTermRecord`], [`LongTermRecord`])
//! - Parallel-array snapshot adapter for memory managers ([`MemorySnapshot`])
//! - Pluggable backends behind [`HistoryStore`]: process-local
//!   ([`InMemoryHistoryStore`]) and `DynamoDB` ([`DynamoHistoryStore`])
//! - Idempotent table provisioning, safe against concurrent creators
//!
//! ## Example
//!
//! ```rust,ignore
//! use memvault::{HistoryStore, InMemoryHistoryStore, SetId, ShortTermRecord};
//!
//! let store = InMemoryHistoryStore::new();
//! let set_id = SetId::new("userA")?;
//! let record = ShortTermRecord::new("1", "hi", "hello", 1000.0)
//!     .with_embedding(vec![0.1, 0.2])
//!     .with_concepts(vec!["greeting".to_string()]);
//! store.save_history(&set_id, &[record], &[])?;
//!
//! let history = store.load_history(&set_id)?;
//! assert_eq!(history.short_term.len(), 1);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// The AWS SDK pulls several versions of the same transitive crates.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod snapshot;
pub mod storage;

pub use config::{BackendKind, DynamoConfig, MemvaultConfig};
pub use models::{LongTermRecord, MemorySet, SetId, ShortTermRecord};
pub use snapshot::{InteractionEntry, MemorySnapshot};
pub use storage::{
    DynamoHistoryStore, HistoryStore, HistoryStoreFactory, InMemoryHistoryStore,
    LocalTableClient,
};

/// Error type for memvault operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `SerializationMismatch` | Snapshot collections differ in length, a record fails validation, a number or the whole item exceeds `DynamoDB` limits, a stored item cannot be decoded |
/// | `SchemaProvisioningFailure` | The backing table could not be created or never became active |
/// | `BackendUnavailable` | Network, timeout, authentication or service errors on a live call |
/// | `InvalidInput` | Empty set id, out-of-range configuration values |
/// | `OperationFailed` | Local failures: config files, runtime creation, logging setup |
///
/// A set id that has never been saved is not an error: loads return an empty
/// [`MemorySet`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// Data did not match the record schema.
    ///
    /// Raised when:
    /// - The parallel collections of a snapshot have different lengths
    /// - An access count is fractional or negative
    /// - A decay factor is outside (0, 1]
    /// - Embeddings in one set have different lengths
    /// - Record ids repeat within a sequence
    /// - A stored item is missing attributes or has the wrong attribute types
    ///
    /// Nothing is written when a save fails with this error.
    #[error("serialization mismatch: {0}")]
    SerializationMismatch(String),

    /// The backing table could not be provisioned.
    ///
    /// Fatal for the backend instance: every later call fails fast with
    /// this error.
    #[error("schema provisioning failed for table '{table}': {cause}")]
    SchemaProvisioningFailure {
        /// The table being provisioned.
        table: String,
        /// The underlying cause.
        cause: String,
    },

    /// A live call to the storage service failed.
    ///
    /// Propagated as-is; the storage layer never retries.
    #[error("backend unavailable during '{operation}': {cause}")]
    BackendUnavailable {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for memvault operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SerializationMismatch("embeddings=3, timestamps=4".to_string());
        assert_eq!(
            err.to_string(),
            "serialization mismatch: embeddings=3, timestamps=4"
        );

        let err = Error::SchemaProvisioningFailure {
            table: "memvault_memory".to_string(),
            cause: "access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "schema provisioning failed for table 'memvault_memory': access denied"
        );

        let err = Error::BackendUnavailable {
            operation: "dynamo_put_item".to_string(),
            cause: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend unavailable during 'dynamo_put_item': timeout"
        );
    }
}
