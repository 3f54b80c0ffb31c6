//! In-process table client.
//!
//! Emulates the subset of `DynamoDB` behavior that [`TableClient`] exposes:
//! tables keyed by a string hash attribute, a creation phase, strongly
//! consistent single-item reads and unconditional single-item writes. Items
//! are stored in their native attribute form, so a
//! [`DynamoHistoryStore`](super::DynamoHistoryStore) running on it exercises
//! the same encoding and decoding as against the real service.
//!
//! Clones share the same tables, which lets several store instances act on one
//! "account" the way separate processes would.

use super::client::{CreateOutcome, Item, TableClient, TableSpec, TableStatus};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process [`TableClient`] for tests and offline development.
#[derive(Debug, Clone, Default)]
pub struct LocalTableClient {
    inner: Arc<Mutex<LocalTables>>,
}

#[derive(Debug, Default)]
struct LocalTables {
    tables: HashMap<String, LocalTable>,
    /// Status polls a new table answers with `Creating` before turning active.
    creation_polls: usize,
    create_requests: usize,
}

#[derive(Debug)]
struct LocalTable {
    spec: TableSpec,
    pending_polls: usize,
    items: HashMap<String, Item>,
}

impl LocalTableClient {
    /// Creates a client whose tables become active immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client whose new tables report `Creating` for `polls`
    /// status checks before becoming active.
    #[must_use]
    pub fn with_creation_delay(polls: usize) -> Self {
        let client = Self::new();
        client.lock().creation_polls = polls;
        client
    }

    /// Number of create-table requests received, including ones answered
    /// with [`CreateOutcome::AlreadyExists`].
    #[must_use]
    pub fn create_requests(&self) -> usize {
        self.lock().create_requests
    }

    /// Number of items stored in `table_name`.
    #[must_use]
    pub fn item_count(&self, table_name: &str) -> usize {
        self.lock()
            .tables
            .get(table_name)
            .map_or(0, |table| table.items.len())
    }

    /// Definition the table was created with.
    #[must_use]
    pub fn table_spec(&self, table_name: &str) -> Option<TableSpec> {
        self.lock()
            .tables
            .get(table_name)
            .map(|table| table.spec.clone())
    }

    /// Returns a copy of the stored item for `key_value`.
    #[must_use]
    pub fn raw_item(&self, table_name: &str, key_value: &str) -> Option<Item> {
        self.lock()
            .tables
            .get(table_name)
            .and_then(|table| table.items.get(key_value).cloned())
    }

    /// Stores an item as-is, bypassing the history store's encoding.
    ///
    /// # Errors
    ///
    /// Same as [`TableClient::put_item`].
    pub fn insert_raw_item(&self, table_name: &str, item: Item) -> Result<()> {
        self.put_item(table_name, item)
    }

    fn lock(&self) -> MutexGuard<'_, LocalTables> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Local table mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }
}

fn not_found(operation: &str, table_name: &str) -> Error {
    Error::BackendUnavailable {
        operation: operation.to_string(),
        cause: format!("ResourceNotFoundException: table '{table_name}' not found"),
    }
}

fn key_value<'a>(operation: &str, table: &LocalTable, item: &'a Item) -> Result<&'a str> {
    item.get(&table.spec.key_attribute)
        .and_then(|value| value.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| Error::BackendUnavailable {
            operation: operation.to_string(),
            cause: format!(
                "ValidationException: missing string key attribute '{}'",
                table.spec.key_attribute
            ),
        })
}

impl TableClient for LocalTableClient {
    fn table_status(&self, table_name: &str) -> Result<TableStatus> {
        let mut tables = self.lock();
        let Some(table) = tables.tables.get_mut(table_name) else {
            return Ok(TableStatus::Missing);
        };
        if table.pending_polls > 0 {
            table.pending_polls -= 1;
            return Ok(TableStatus::Creating);
        }
        Ok(TableStatus::Active)
    }

    fn create_table(&self, spec: &TableSpec) -> Result<CreateOutcome> {
        let mut tables = self.lock();
        tables.create_requests += 1;
        if tables.tables.contains_key(&spec.table_name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let pending_polls = tables.creation_polls;
        tables.tables.insert(
            spec.table_name.clone(),
            LocalTable {
                spec: spec.clone(),
                pending_polls,
                items: HashMap::new(),
            },
        );
        Ok(CreateOutcome::Created)
    }

    fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>> {
        let tables = self.lock();
        let table = tables
            .tables
            .get(table_name)
            .ok_or_else(|| not_found("local_get_item", table_name))?;
        let key = key_value("local_get_item", table, &key)?;
        Ok(table.items.get(key).cloned())
    }

    fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        let mut tables = self.lock();
        let table = tables
            .tables
            .get_mut(table_name)
            .ok_or_else(|| not_found("local_put_item", table_name))?;
        if table.pending_polls > 0 {
            return Err(Error::BackendUnavailable {
                operation: "local_put_item".to_string(),
                cause: format!("ResourceNotFoundException: table '{table_name}' is being created"),
            });
        }
        let key = key_value("local_put_item", table, &item)?.to_string();
        super::codec::check_storable(&item)?;
        table.items.insert(key, item);
        Ok(())
    }
}
