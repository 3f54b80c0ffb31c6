//! `DynamoDB`-backed history store.
//!
//! Each memory set is one item in a single table, keyed by `setId`. Saves
//! write the whole item with an unconditional `PutItem`; loads are strongly
//! consistent `GetItem` calls.
//!
//! # Lifecycle
//!
//! ```text
//! +---------------+  table missing/creating  +--------------+   active   +-------+
//! | Uninitialized | -----------------------> | Provisioning | ---------> | Ready |
//! +---------------+                          +--------------+            +-------+
//!         |            table already active                                  ^
//!         +--------------------------------------------------------------------+
//!         |                                         |
//!         |           any provisioning error        v
//!         +-------------------------------------> Failed
//! ```
//!
//! Provisioning runs once, when the store is constructed. A store in `Failed`
//! answers every call with [`Error::SchemaProvisioningFailure`] without
//! touching the network.
//!
//! # Limitations
//!
//! No optimistic concurrency token is used: two concurrent saves for the same
//! set id race and the last write wins.

pub mod codec;
mod client;
mod local;

pub use client::{AwsTableClient, CreateOutcome, Item, TableClient, TableSpec, TableStatus};
pub use local::LocalTableClient;

use crate::config::DynamoConfig;
use crate::models::{LongTermRecord, MemorySet, SetId, ShortTermRecord, validate_history};
use crate::storage::traits::HistoryStore;
use crate::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Provisioning state of a [`DynamoHistoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    /// Provisioning has not started.
    Uninitialized,
    /// The table is being created or waited on.
    Provisioning,
    /// The table is active; loads and saves are served.
    Ready,
    /// Provisioning failed; the store is unusable.
    Failed(String),
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(cause) => write!(f, "failed ({cause})"),
        }
    }
}

/// History store persisting memory sets in a `DynamoDB` table.
pub struct DynamoHistoryStore<C: TableClient = AwsTableClient> {
    /// Table client.
    client: C,
    /// Table name for memory sets.
    table_name: String,
    /// Provisioning state, settled during construction.
    state: BackendState,
}

impl DynamoHistoryStore<AwsTableClient> {
    /// Connects to `DynamoDB` and provisions the table if needed.
    ///
    /// Provisioning failures do not fail construction; they leave the store
    /// in [`BackendState::Failed`]. Use [`Self::ensure_ready`] to surface
    /// them eagerly.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK client cannot be created.
    pub fn connect(config: &DynamoConfig) -> Result<Self> {
        let client = AwsTableClient::connect(config)?;
        Ok(Self::with_client(client, config))
    }
}

impl<C: TableClient> DynamoHistoryStore<C> {
    /// Creates a store on top of `client` and provisions the table.
    ///
    /// Blocks until the table is active, provisioning fails, or
    /// `config.provision_timeout` elapses.
    pub fn with_client(client: C, config: &DynamoConfig) -> Self {
        let mut store = Self {
            client,
            table_name: config.table_name.clone(),
            state: BackendState::Uninitialized,
        };

        let outcome = config.validate().and_then(|()| store.provision(config));
        store.state = match outcome {
            Ok(()) => {
                metrics::counter!("memvault_table_provisioning_total", "outcome" => "ready")
                    .increment(1);
                BackendState::Ready
            },
            Err(e) => {
                tracing::error!(table = %store.table_name, error = %e, "DynamoDB table provisioning failed");
                metrics::counter!("memvault_table_provisioning_total", "outcome" => "failed")
                    .increment(1);
                BackendState::Failed(e.to_string())
            },
        };
        store
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the provisioning state.
    #[must_use]
    pub const fn state(&self) -> &BackendState {
        &self.state
    }

    /// Returns true if loads and saves are being served.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, BackendState::Ready)
    }

    /// Returns the underlying table client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Fails unless the store is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaProvisioningFailure`] in any state but
    /// [`BackendState::Ready`].
    pub fn ensure_ready(&self) -> Result<()> {
        match &self.state {
            BackendState::Ready => Ok(()),
            BackendState::Failed(cause) => Err(Error::SchemaProvisioningFailure {
                table: self.table_name.clone(),
                cause: cause.clone(),
            }),
            other => Err(Error::SchemaProvisioningFailure {
                table: self.table_name.clone(),
                cause: format!("store is {other}"),
            }),
        }
    }

    /// Makes sure the table exists and is active.
    ///
    /// Safe to run from several processes at once: a create request that
    /// finds the table already present counts as success.
    fn provision(&mut self, config: &DynamoConfig) -> Result<()> {
        let status = self
            .client
            .table_status(&self.table_name)
            .map_err(|e| self.provisioning_error(&e))?;

        match status {
            TableStatus::Active => {
                tracing::debug!(table = %self.table_name, "DynamoDB table already active");
                return Ok(());
            },
            TableStatus::Missing => {
                self.state = BackendState::Provisioning;
                let spec = TableSpec::from_config(config);
                let outcome = self
                    .client
                    .create_table(&spec)
                    .map_err(|e| self.provisioning_error(&e))?;
                match outcome {
                    CreateOutcome::Created => tracing::info!(
                        table = %self.table_name,
                        read_capacity_units = spec.read_capacity_units,
                        write_capacity_units = spec.write_capacity_units,
                        "Creating DynamoDB table"
                    ),
                    CreateOutcome::AlreadyExists => tracing::info!(
                        table = %self.table_name,
                        "DynamoDB table was created concurrently, waiting for it"
                    ),
                }
            },
            status if status.is_transitional() => {
                self.state = BackendState::Provisioning;
                tracing::info!(table = %self.table_name, %status, "Waiting for DynamoDB table");
            },
            status => {
                return Err(Error::SchemaProvisioningFailure {
                    table: self.table_name.clone(),
                    cause: format!("table is {status}"),
                });
            },
        }

        self.wait_until_active(config.provision_timeout, config.provision_poll_interval)
    }

    /// Polls the table status until it turns active.
    fn wait_until_active(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let status = self
                .client
                .table_status(&self.table_name)
                .map_err(|e| self.provisioning_error(&e))?;
            match status {
                TableStatus::Active => {
                    tracing::info!(
                        table = %self.table_name,
                        waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "DynamoDB table is active"
                    );
                    return Ok(());
                },
                // Missing right after a create is the service catching up.
                TableStatus::Missing | TableStatus::Creating | TableStatus::Updating => {},
                status => {
                    return Err(Error::SchemaProvisioningFailure {
                        table: self.table_name.clone(),
                        cause: format!("table became {status} while waiting"),
                    });
                },
            }

            if started.elapsed() >= timeout {
                return Err(Error::SchemaProvisioningFailure {
                    table: self.table_name.clone(),
                    cause: format!("table not active after {}s", timeout.as_secs()),
                });
            }
            std::thread::sleep(poll_interval);
        }
    }

    fn provisioning_error(&self, e: &Error) -> Error {
        Error::SchemaProvisioningFailure {
            table: self.table_name.clone(),
            cause: e.to_string(),
        }
    }

    fn record_failure(operation: &'static str) {
        metrics::counter!(
            "memvault_history_failures_total",
            "backend" => "dynamodb",
            "operation" => operation
        )
        .increment(1);
    }
}

impl<C: TableClient> HistoryStore for DynamoHistoryStore<C> {
    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }

    #[instrument(skip(self), fields(backend = "dynamodb", table = %self.table_name, set_id = %set_id))]
    fn load_history(&self, set_id: &SetId) -> Result<MemorySet> {
        self.ensure_ready()?;

        let item = self
            .client
            .get_item(&self.table_name, codec::key_for(set_id))
            .inspect_err(|_| Self::record_failure("load"))?;
        let Some(item) = item else {
            tracing::debug!("No persisted history");
            return Ok(MemorySet::default());
        };

        let set = codec::decode_item(&item)
            .and_then(|set| set.validate().map(|()| set))
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Stored history failed validation");
                Self::record_failure("decode");
            })?;

        tracing::debug!(
            short_term = set.short_term.len(),
            long_term = set.long_term.len(),
            "Loaded interaction history"
        );
        metrics::counter!("memvault_history_loads_total", "backend" => "dynamodb").increment(1);
        Ok(set)
    }

    #[instrument(
        skip(self, short_term, long_term),
        fields(backend = "dynamodb", table = %self.table_name, set_id = %set_id)
    )]
    fn save_history(
        &self,
        set_id: &SetId,
        short_term: &[ShortTermRecord],
        long_term: &[LongTermRecord],
    ) -> Result<()> {
        self.ensure_ready()?;
        validate_history(short_term, long_term).inspect_err(|_| Self::record_failure("save"))?;

        let item = codec::encode_item(set_id, short_term, long_term);
        codec::check_storable(&item).inspect_err(|e| {
            tracing::warn!(error = %e, "History cannot be stored in DynamoDB");
            Self::record_failure("save");
        })?;
        self.client
            .put_item(&self.table_name, item)
            .inspect_err(|_| Self::record_failure("save"))?;

        tracing::info!(
            short_term = short_term.len(),
            long_term = long_term.len(),
            "Saved interaction history"
        );
        metrics::counter!("memvault_history_saves_total", "backend" => "dynamodb").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> DynamoConfig {
        DynamoConfig::default()
            .with_table_name("memvault_test")
            .with_provision_polling(Duration::from_secs(5), Duration::ZERO)
    }

    fn set_id(id: &str) -> SetId {
        SetId::new(id).unwrap()
    }

    fn record(id: &str) -> ShortTermRecord {
        ShortTermRecord::new(id, "hi", "hello", 1000.0)
            .with_embedding(vec![0.1, 0.2])
            .with_concepts(vec!["greeting".to_string()])
    }

    /// Scripted client for provisioning paths the local client cannot reach.
    struct ScriptedClient {
        statuses: Mutex<VecDeque<Result<TableStatus>>>,
        create: fn() -> Result<CreateOutcome>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<Result<TableStatus>>, create: fn() -> Result<CreateOutcome>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                create,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TableClient for ScriptedClient {
        fn table_status(&self, _table_name: &str) -> Result<TableStatus> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TableStatus::Active))
        }

        fn create_table(&self, _spec: &TableSpec) -> Result<CreateOutcome> {
            (self.create)()
        }

        fn get_item(&self, _table_name: &str, _key: Item) -> Result<Option<Item>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn put_item(&self, _table_name: &str, _item: Item) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_missing_table_is_created_with_configured_throughput() {
        let client = LocalTableClient::with_creation_delay(2);
        let store = DynamoHistoryStore::with_client(client.clone(), &config().with_capacity(4, 2));

        assert!(store.is_ready());
        assert_eq!(client.create_requests(), 1);
        let spec = client.table_spec("memvault_test").unwrap();
        assert_eq!(spec.key_attribute, "setId");
        assert_eq!(spec.read_capacity_units, 4);
        assert_eq!(spec.write_capacity_units, 2);
    }

    #[test]
    fn test_second_instance_skips_creation_and_keeps_data() {
        let client = LocalTableClient::new();
        let first = DynamoHistoryStore::with_client(client.clone(), &config());
        first
            .save_history(&set_id("u"), &[record("1")], &[])
            .unwrap();

        let second = DynamoHistoryStore::with_client(client.clone(), &config());
        assert!(second.is_ready());
        assert_eq!(client.create_requests(), 1);
        let history = second.load_history(&set_id("u")).unwrap();
        assert_eq!(history.short_term, vec![record("1")]);
    }

    #[test]
    fn test_concurrent_creation_counts_as_success() {
        let client = ScriptedClient::new(
            vec![
                Ok(TableStatus::Missing),
                Ok(TableStatus::Creating),
                Ok(TableStatus::Active),
            ],
            || Ok(CreateOutcome::AlreadyExists),
        );
        let store = DynamoHistoryStore::with_client(client, &config());
        assert_eq!(store.state(), &BackendState::Ready);
    }

    #[test]
    fn test_create_failure_leaves_store_failed() {
        let client = ScriptedClient::new(vec![Ok(TableStatus::Missing)], || {
            Err(Error::BackendUnavailable {
                operation: "dynamo_create_table".to_string(),
                cause: "AccessDeniedException".to_string(),
            })
        });
        let store = DynamoHistoryStore::with_client(client, &config());

        assert!(matches!(store.state(), BackendState::Failed(cause) if cause.contains("AccessDenied")));
        let err = store.load_history(&set_id("u")).unwrap_err();
        assert!(matches!(err, Error::SchemaProvisioningFailure { .. }));
        let err = store.save_history(&set_id("u"), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::SchemaProvisioningFailure { .. }));
        assert!(store.ensure_ready().is_err());
        // Failed stores never reach the table.
        assert_eq!(store.client().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_describe_failure_leaves_store_failed() {
        let client = ScriptedClient::new(
            vec![Err(Error::BackendUnavailable {
                operation: "dynamo_describe_table".to_string(),
                cause: "connection refused".to_string(),
            })],
            || Ok(CreateOutcome::Created),
        );
        let store = DynamoHistoryStore::with_client(client, &config());
        assert!(!store.is_ready());
    }

    #[test]
    fn test_table_stuck_creating_times_out() {
        let client = ScriptedClient::new(
            std::iter::repeat_with(|| Ok(TableStatus::Creating))
                .take(64)
                .collect(),
            || Ok(CreateOutcome::Created),
        );
        let config = config().with_provision_polling(Duration::ZERO, Duration::ZERO);
        let store = DynamoHistoryStore::with_client(client, &config);
        assert!(matches!(store.state(), BackendState::Failed(cause) if cause.contains("not active")));
    }

    #[test]
    fn test_deleting_table_is_a_provisioning_failure() {
        let client = ScriptedClient::new(vec![Ok(TableStatus::Deleting)], || {
            Ok(CreateOutcome::Created)
        });
        let store = DynamoHistoryStore::with_client(client, &config());
        assert!(matches!(store.state(), BackendState::Failed(_)));
    }

    #[test]
    fn test_invalid_capacity_fails_provisioning() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config().with_capacity(0, 1));
        assert!(!store.is_ready());
        assert_eq!(client.create_requests(), 0);
    }

    #[test]
    fn test_save_writes_one_item_per_set() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        store
            .save_history(&set_id("a"), &[record("1"), record("2")], &[])
            .unwrap();
        store.save_history(&set_id("a"), &[record("3")], &[]).unwrap();
        store.save_history(&set_id("b"), &[], &[]).unwrap();

        assert_eq!(client.item_count("memvault_test"), 2);
        let history = store.load_history(&set_id("a")).unwrap();
        assert_eq!(history.short_term, vec![record("3")]);
    }

    #[test]
    fn test_rejected_save_leaves_item_untouched() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        store.save_history(&set_id("u"), &[record("1")], &[]).unwrap();
        let before = client.raw_item("memvault_test", "u");

        let mismatched = vec![record("2"), record("3").with_embedding(vec![0.5])];
        let err = store.save_history(&set_id("u"), &mismatched, &[]).unwrap_err();
        assert!(matches!(err, Error::SerializationMismatch(_)));
        assert_eq!(client.raw_item("memvault_test", "u"), before);
    }

    #[test]
    fn test_out_of_range_number_leaves_item_untouched() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        store.save_history(&set_id("u"), &[record("1")], &[]).unwrap();
        let before = client.raw_item("memvault_test", "u");

        let far_future = ShortTermRecord::new("2", "hi", "hello", 1e200);
        let err = store.save_history(&set_id("u"), &[far_future], &[]).unwrap_err();
        assert!(matches!(err, Error::SerializationMismatch(_)));

        let tiny = record("3").with_embedding(vec![0.1, 1e-200]);
        let err = store.save_history(&set_id("u"), &[tiny], &[]).unwrap_err();
        assert!(matches!(err, Error::SerializationMismatch(_)));

        assert_eq!(client.raw_item("memvault_test", "u"), before);
        assert_eq!(store.load_history(&set_id("u")).unwrap().short_term, vec![record("1")]);
    }

    #[test]
    fn test_oversized_item_leaves_item_untouched() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        store.save_history(&set_id("u"), &[record("1")], &[]).unwrap();
        let before = client.raw_item("memvault_test", "u");

        let mut large = record("2");
        large.prompt = "x".repeat(codec::MAX_ITEM_BYTES);
        let err = store.save_history(&set_id("u"), &[large], &[]).unwrap_err();
        assert!(matches!(err, Error::SerializationMismatch(ref msg) if msg.contains("limit")));

        assert_eq!(client.raw_item("memvault_test", "u"), before);
    }

    #[test]
    fn test_corrupt_stored_item_is_reported() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        let mut item = codec::encode_item(&set_id("u"), &[record("1")], &[]);
        item.remove(codec::LONG_TERM_ATTR);
        client.insert_raw_item("memvault_test", item).unwrap();

        let err = store.load_history(&set_id("u")).unwrap_err();
        assert!(matches!(err, Error::SerializationMismatch(_)));
    }

    #[test]
    fn test_stored_item_breaking_invariants_is_reported() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client.clone(), &config());
        let item = codec::encode_item(
            &set_id("u"),
            &[record("1"), record("2").with_embedding(vec![0.1])],
            &[],
        );
        client.insert_raw_item("memvault_test", item).unwrap();

        assert!(store.load_history(&set_id("u")).is_err());
    }

    #[test]
    fn test_backend_errors_propagate_unchanged() {
        let client = LocalTableClient::new();
        let store = DynamoHistoryStore::with_client(client, &config());
        let other = DynamoHistoryStore {
            client: LocalTableClient::new(),
            table_name: "dropped".to_string(),
            state: BackendState::Ready,
        };

        assert!(store.load_history(&set_id("u")).is_ok());
        let err = other.save_history(&set_id("u"), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
    }
}
