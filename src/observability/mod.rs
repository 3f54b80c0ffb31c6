//! Observability.
//!
//! Backends emit `tracing` events and spans and `metrics` counters. This
//! module installs the process-wide `tracing` subscriber; metrics exporters
//! are left to the embedding application.
//!
//! | Counter | Labels |
//! |---------|--------|
//! | `memvault_history_loads_total` | `backend` |
//! | `memvault_history_saves_total` | `backend` |
//! | `memvault_history_failures_total` | `backend`, `operation` |
//! | `memvault_table_provisioning_total` | `outcome` |
//! | `memvault_memory_lock_poison_recovery_total` | |

mod logging;

pub use logging::{DEFAULT_FILTER, LogFormat, LoggingConfig};

use crate::config::MemvaultConfig;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging from the loaded configuration and the environment.
///
/// # Errors
///
/// Same as [`init_logging`].
pub fn init_from_config(config: &MemvaultConfig) -> Result<()> {
    init_logging(LoggingConfig::from_settings(Some(&config.logging)))
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if logging has already been initialized, the filter
/// directive is invalid, or the log file cannot be opened.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        Error::InvalidInput(format!("invalid log filter '{}': {e}", config.filter))
    })?;

    // `&File` writes are unbuffered appends, so a shared handle needs no lock.
    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Arc::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt_layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty if config.file.is_some() => fmt_layer.with_ansi(false).boxed(),
        LogFormat::Pretty => fmt_layer.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: e.to_string(),
        })?;

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })?;

    tracing::debug!(format = ?config.format, filter = %config.filter, "Logging initialized");
    Ok(())
}

/// Opens `path` for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    path.parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(path))
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}
