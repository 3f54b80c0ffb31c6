//! Table client abstraction over the `DynamoDB` API.
//!
//! [`DynamoHistoryStore`](super::DynamoHistoryStore) only needs four calls:
//! describe, create, get and put. [`TableClient`] captures exactly those so the
//! store can run against the AWS SDK ([`AwsTableClient`]) or an in-process
//! table ([`LocalTableClient`](super::LocalTableClient)).

use crate::config::DynamoConfig;
use crate::{Error, Result};
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ScalarAttributeType,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Runtime as TokioRuntime;

/// A `DynamoDB` item: attribute name to native attribute value.
pub type Item = HashMap<String, AttributeValue>;

/// Lifecycle status of a table, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    /// The table does not exist.
    Missing,
    /// The table is being created.
    Creating,
    /// The table is being updated; reads and writes are served.
    Updating,
    /// The table is ready.
    Active,
    /// The table is being deleted.
    Deleting,
    /// Any other status (archiving, inaccessible encryption key, ...).
    Other(String),
}

impl TableStatus {
    /// Returns true while the service is still working towards `Active`.
    #[must_use]
    pub const fn is_transitional(&self) -> bool {
        matches!(self, Self::Creating | Self::Updating)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Creating => write!(f, "creating"),
            Self::Updating => write!(f, "updating"),
            Self::Active => write!(f, "active"),
            Self::Deleting => write!(f, "deleting"),
            Self::Other(status) => write!(f, "{status}"),
        }
    }
}

impl From<&aws_sdk_dynamodb::types::TableStatus> for TableStatus {
    fn from(status: &aws_sdk_dynamodb::types::TableStatus) -> Self {
        use aws_sdk_dynamodb::types::TableStatus as Aws;
        match status {
            Aws::Creating => Self::Creating,
            Aws::Updating => Self::Updating,
            Aws::Active => Self::Active,
            Aws::Deleting => Self::Deleting,
            other => Self::Other(other.as_str().to_string()),
        }
    }
}

/// Result of a create-table request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This request created the table.
    Created,
    /// The table already existed, typically created by a concurrent instance.
    AlreadyExists,
}

/// Table definition used when provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub table_name: String,
    /// Name of the string hash key attribute.
    pub key_attribute: String,
    /// Provisioned read capacity units.
    pub read_capacity_units: i64,
    /// Provisioned write capacity units.
    pub write_capacity_units: i64,
}

impl TableSpec {
    /// Builds the table definition for a memory set table.
    #[must_use]
    pub fn from_config(config: &DynamoConfig) -> Self {
        Self {
            table_name: config.table_name.clone(),
            key_attribute: super::codec::SET_ID_ATTR.to_string(),
            read_capacity_units: config.read_capacity_units,
            write_capacity_units: config.write_capacity_units,
        }
    }
}

/// The table operations a history store needs.
///
/// All calls block until the service answers. Implementations report service
/// and transport failures as [`Error::BackendUnavailable`] and never retry.
pub trait TableClient: Send + Sync {
    /// Returns the table's status, or [`TableStatus::Missing`].
    fn table_status(&self, table_name: &str) -> Result<TableStatus>;

    /// Requests creation of the table.
    ///
    /// A table that already exists is reported as
    /// [`CreateOutcome::AlreadyExists`], not as an error.
    fn create_table(&self, spec: &TableSpec) -> Result<CreateOutcome>;

    /// Reads one item by key, with strong consistency.
    fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>>;

    /// Writes one item, unconditionally replacing any item with the same key.
    ///
    /// An item the service refuses to store (a number out of range, an item
    /// over the size limit) is reported as [`Error::SerializationMismatch`];
    /// retrying it cannot succeed.
    fn put_item(&self, table_name: &str, item: Item) -> Result<()>;
}

/// Helper to map SDK errors.
fn unavailable<E>(operation: &str, e: E) -> Error
where
    E: std::error::Error + 'static,
{
    Error::BackendUnavailable {
        operation: operation.to_string(),
        cause: DisplayErrorContext(e).to_string(),
    }
}

/// Error code the service returns for a request it will never accept.
const VALIDATION_ERROR_CODE: &str = "ValidationException";

/// Returns true if `code` marks a rejected request rather than a transport
/// or capacity failure.
fn is_validation_error(code: Option<&str>) -> bool {
    code == Some(VALIDATION_ERROR_CODE)
}

/// Helper to map request builder errors.
fn build_error(e: impl fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "dynamo_build_request".to_string(),
        cause: e.to_string(),
    }
}

/// [`TableClient`] backed by the AWS SDK.
///
/// The SDK is async; this client owns a Tokio runtime and blocks on it, so it
/// must not be called from inside another runtime's worker thread.
#[derive(Debug, Clone)]
pub struct AwsTableClient {
    /// SDK client.
    client: Client,
    /// Tokio runtime for blocking operations.
    runtime: Arc<TokioRuntime>,
}

impl AwsTableClient {
    /// Creates a client for the configured region and endpoint.
    ///
    /// Credentials are resolved through the SDK's default provider chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the Tokio runtime cannot be created.
    pub fn connect(config: &DynamoConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("memvault-dynamo")
            .enable_all()
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "create_tokio_runtime".to_string(),
                cause: e.to_string(),
            })?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        if let Some(timeout) = config.operation_timeout {
            loader = loader.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }
        let sdk_config = runtime.block_on(loader.load());

        tracing::debug!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Created DynamoDB client"
        );

        Ok(Self::from_parts(Client::new(&sdk_config), Arc::new(runtime)))
    }

    /// Wraps an existing SDK client and the runtime that drives it.
    #[must_use]
    pub const fn from_parts(client: Client, runtime: Arc<TokioRuntime>) -> Self {
        Self { client, runtime }
    }
}

impl TableClient for AwsTableClient {
    fn table_status(&self, table_name: &str) -> Result<TableStatus> {
        let result = self
            .runtime
            .block_on(self.client.describe_table().table_name(table_name).send());

        match result {
            Ok(output) => Ok(output
                .table()
                .and_then(|table| table.table_status())
                .map_or_else(|| TableStatus::Other("unknown".to_string()), TableStatus::from)),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(TableStatus::Missing)
            },
            Err(e) => Err(unavailable("dynamo_describe_table", e)),
        }
    }

    fn create_table(&self, spec: &TableSpec) -> Result<CreateOutcome> {
        let key_definition = AttributeDefinition::builder()
            .attribute_name(&spec.key_attribute)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(build_error)?;
        let key_schema = KeySchemaElement::builder()
            .attribute_name(&spec.key_attribute)
            .key_type(KeyType::Hash)
            .build()
            .map_err(build_error)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(spec.read_capacity_units)
            .write_capacity_units(spec.write_capacity_units)
            .build()
            .map_err(build_error)?;

        let result = self.runtime.block_on(
            self.client
                .create_table()
                .table_name(&spec.table_name)
                .attribute_definitions(key_definition)
                .key_schema(key_schema)
                .provisioned_throughput(throughput)
                .send(),
        );

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_in_use_exception()) =>
            {
                Ok(CreateOutcome::AlreadyExists)
            },
            Err(e) => Err(unavailable("dynamo_create_table", e)),
        }
    }

    fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_item()
                    .table_name(table_name)
                    .set_key(Some(key))
                    .consistent_read(true)
                    .send(),
            )
            .map_err(|e| unavailable("dynamo_get_item", e))?;

        Ok(output.item().cloned())
    }

    fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        let result = self.runtime.block_on(
            self.client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .send(),
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_validation_error(e.as_service_error().and_then(|se| se.code())) => {
                let cause = DisplayErrorContext(&e).to_string();
                Err(Error::SerializationMismatch(format!(
                    "item rejected by DynamoDB: {cause}"
                )))
            },
            Err(e) => Err(unavailable("dynamo_put_item", e)),
        }
    }
}
