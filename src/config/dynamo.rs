//! `DynamoDB` backend configuration.

use crate::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Default table name for memory sets.
pub const DEFAULT_TABLE_NAME: &str = "memvault_memory";

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Settings for [`DynamoHistoryStore`](crate::storage::DynamoHistoryStore).
///
/// Resolved once by the composition root and passed in; the store never reads
/// the environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoConfig {
    /// Table holding one item per memory set.
    pub table_name: String,
    /// Endpoint override, e.g. `http://localhost:8000` for `DynamoDB` Local.
    pub endpoint: Option<String>,
    /// AWS region.
    pub region: String,
    /// Provisioned read capacity units used when creating the table.
    pub read_capacity_units: i64,
    /// Provisioned write capacity units used when creating the table.
    pub write_capacity_units: i64,
    /// Upper bound on waiting for the table to become active.
    pub provision_timeout: Duration,
    /// Delay between table status checks while provisioning.
    pub provision_poll_interval: Duration,
    /// Per-operation timeout applied by the SDK. `None` keeps SDK defaults.
    pub operation_timeout: Option<Duration>,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            read_capacity_units: 1,
            write_capacity_units: 1,
            provision_timeout: Duration::from_secs(300),
            provision_poll_interval: Duration::from_secs(1),
            operation_timeout: None,
        }
    }
}

/// `[dynamo]` section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDynamo {
    /// Table name.
    pub table_name: Option<String>,
    /// Endpoint override.
    pub endpoint: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Read capacity units.
    pub read_capacity_units: Option<i64>,
    /// Write capacity units.
    pub write_capacity_units: Option<i64>,
    /// Provisioning timeout in seconds.
    pub provision_timeout_secs: Option<u64>,
    /// Provisioning poll interval in milliseconds.
    pub provision_poll_interval_ms: Option<u64>,
    /// Operation timeout in milliseconds.
    pub operation_timeout_ms: Option<u64>,
}

impl DynamoConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the endpoint override.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the provisioned read and write capacity units.
    #[must_use]
    pub const fn with_capacity(mut self, read: i64, write: i64) -> Self {
        self.read_capacity_units = read;
        self.write_capacity_units = write;
        self
    }

    /// Sets the provisioning timeout and poll interval.
    #[must_use]
    pub const fn with_provision_polling(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.provision_timeout = timeout;
        self.provision_poll_interval = poll_interval;
        self
    }

    /// Sets the SDK operation timeout.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Checks the settings before they reach the service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty table name or region, or
    /// for capacity units below 1.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(Error::InvalidInput("table name must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(Error::InvalidInput("region must not be empty".to_string()));
        }
        if self.read_capacity_units < 1 || self.write_capacity_units < 1 {
            return Err(Error::InvalidInput(format!(
                "capacity units must be at least 1 (read={}, write={})",
                self.read_capacity_units, self.write_capacity_units
            )));
        }
        Ok(())
    }

    /// Applies a `[dynamo]` config file section.
    pub(crate) fn apply_file(&mut self, file: ConfigFileDynamo) {
        if let Some(table_name) = file.table_name {
            self.table_name = table_name;
        }
        if file.endpoint.is_some() {
            self.endpoint = file.endpoint;
        }
        if let Some(region) = file.region {
            self.region = region;
        }
        if let Some(units) = file.read_capacity_units {
            self.read_capacity_units = units;
        }
        if let Some(units) = file.write_capacity_units {
            self.write_capacity_units = units;
        }
        if let Some(secs) = file.provision_timeout_secs {
            self.provision_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.provision_poll_interval_ms {
            self.provision_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.operation_timeout_ms {
            self.operation_timeout = Some(Duration::from_millis(ms));
        }
    }

    /// Applies `MEMVAULT_DYNAMO_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `MEMVAULT_DYNAMO_*` overrides from `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table_name) = non_empty(&lookup, "MEMVAULT_DYNAMO_TABLE") {
            self.table_name = table_name;
        }
        if let Some(endpoint) = non_empty(&lookup, "MEMVAULT_DYNAMO_HOST") {
            self.endpoint = Some(endpoint);
        }
        if let Some(region) = non_empty(&lookup, "MEMVAULT_DYNAMO_REGION") {
            self.region = region;
        }
        if let Some(units) = parsed(&lookup, "MEMVAULT_DYNAMO_READ_CAPACITY") {
            self.read_capacity_units = units;
        }
        if let Some(units) = parsed(&lookup, "MEMVAULT_DYNAMO_WRITE_CAPACITY") {
            self.write_capacity_units = units;
        }
        if let Some(secs) = parsed(&lookup, "MEMVAULT_DYNAMO_PROVISION_TIMEOUT_SECS") {
            self.provision_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parsed(&lookup, "MEMVAULT_DYNAMO_OPERATION_TIMEOUT_MS") {
            self.operation_timeout = Some(Duration::from_millis(ms));
        }
        self
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = non_empty(lookup, key)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(key, value = %value, error = %e, "Ignoring unparseable environment override");
            None
        },
    }
}
