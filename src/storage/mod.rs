//! Storage layer abstraction.
//!
//! One trait, [`HistoryStore`], with two implementations:
//! - **Memory**: process-local reference store ([`InMemoryHistoryStore`])
//! - **`DynamoDB`**: durable store, one item per memory set ([`DynamoHistoryStore`])
//!
//! [`HistoryStoreFactory`] picks one from [`MemvaultConfig`].

// Dropping table clients slightly early provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod dynamo;
pub mod memory;
pub mod traits;

pub use dynamo::{
    AwsTableClient, BackendState, DynamoHistoryStore, LocalTableClient, TableClient, TableStatus,
};
pub use memory::InMemoryHistoryStore;
pub use traits::HistoryStore;

use crate::Result;
use crate::config::{BackendKind, MemvaultConfig};
use std::sync::Arc;

/// Factory for creating the configured history store.
pub struct HistoryStoreFactory;

impl HistoryStoreFactory {
    /// Creates the history store selected by `config.backend`.
    ///
    /// A `DynamoDB` store is only returned once its table is active, so
    /// provisioning problems surface here rather than on the first save.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The `DynamoDB` client cannot be created
    /// - The table cannot be provisioned
    pub fn create(config: &MemvaultConfig) -> Result<Arc<dyn HistoryStore>> {
        tracing::info!(backend = config.backend.as_str(), "Creating history store");
        match config.backend {
            BackendKind::Memory => Ok(Arc::new(InMemoryHistoryStore::new())),
            BackendKind::DynamoDb => {
                let store = DynamoHistoryStore::connect(&config.dynamo)?;
                store.ensure_ready()?;
                Ok(Arc::new(store))
            },
        }
    }

    /// Creates an in-memory store.
    #[must_use]
    pub fn create_in_memory() -> Arc<dyn HistoryStore> {
        Arc::new(InMemoryHistoryStore::new())
    }

    /// Creates a `DynamoDB` store on top of an existing table client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaProvisioningFailure`](crate::Error::SchemaProvisioningFailure)
    /// if the table cannot be provisioned.
    pub fn create_with_client<C>(
        client: C,
        config: &crate::config::DynamoConfig,
    ) -> Result<Arc<dyn HistoryStore>>
    where
        C: TableClient + 'static,
    {
        let store = DynamoHistoryStore::with_client(client, config);
        store.ensure_ready()?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DynamoConfig;
    use crate::models::SetId;
    use std::time::Duration;

    #[test]
    fn test_factory_defaults_to_memory() {
        let store = HistoryStoreFactory::create(&MemvaultConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(HistoryStoreFactory::create_in_memory().backend_name(), "memory");
    }

    #[test]
    fn test_factory_with_local_client() {
        let config = DynamoConfig::default()
            .with_provision_polling(Duration::from_secs(1), Duration::ZERO);
        let store = HistoryStoreFactory::create_with_client(LocalTableClient::new(), &config).unwrap();
        assert_eq!(store.backend_name(), "dynamodb");
        let history = store.load_history(&SetId::new("anyone").unwrap()).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_factory_surfaces_provisioning_failure() {
        let config = DynamoConfig::default().with_capacity(0, 0);
        let result = HistoryStoreFactory::create_with_client(LocalTableClient::new(), &config);
        assert!(matches!(
            result,
            Err(crate::Error::SchemaProvisioningFailure { .. })
        ));
    }
}
