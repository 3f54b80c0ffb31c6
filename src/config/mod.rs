//! Configuration management.
//!
//! Resolution order, later sources winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` (explicit path, or the platform config dir)
//! 3. `MEMVAULT_*` environment variables, after loading `.env` if present

mod dynamo;

pub use dynamo::{ConfigFileDynamo, DEFAULT_REGION, DEFAULT_TABLE_NAME, DynamoConfig};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for memvault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemvaultConfig {
    /// Which history store the composition root builds.
    pub backend: BackendKind,
    /// `DynamoDB` settings, used when `backend` is [`BackendKind::DynamoDb`].
    pub dynamo: DynamoConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Available history store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process-local store, nothing persisted.
    #[default]
    Memory,
    /// Amazon `DynamoDB`.
    DynamoDb,
}

impl BackendKind {
    /// Parses a backend name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Some(Self::Memory),
            "dynamodb" | "dynamo" => Some(Self::DynamoDb),
            _ => None,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::DynamoDb => "dynamodb",
        }
    }
}

/// Logging settings from the config file.
///
/// Environment variables are applied later, by
/// [`LoggingConfig::from_settings`](crate::observability::LoggingConfig::from_settings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Output format: "pretty" or "json".
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `memvault=debug`.
    pub filter: Option<String>,
    /// Log file path. Logs go to stderr when unset.
    pub file: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Backend name.
    pub backend: Option<String>,
    /// `DynamoDB` section.
    pub dynamo: Option<ConfigFileDynamo>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

impl MemvaultConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the full configuration: `.env`, default file, then environment.
    #[must_use]
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::load_default().with_env_overrides()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown backend.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/memvault/` on macOS)
    /// 2. XDG config dir (`~/.config/memvault/` for Unix compatibility)
    ///
    /// Returns default configuration if no usable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("memvault").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("memvault")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `MemvaultConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = file.backend {
            config.backend = BackendKind::parse(&backend).ok_or_else(|| {
                crate::Error::InvalidInput(format!("unknown backend '{backend}'"))
            })?;
        }
        if let Some(dynamo) = file.dynamo {
            config.dynamo.apply_file(dynamo);
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        Ok(config)
    }

    /// Applies `MEMVAULT_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `MEMVAULT_*` overrides from `lookup`.
    ///
    /// Logging variables are not read here; they are resolved when logging
    /// is initialized.
    #[must_use]
    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MEMVAULT_BACKEND") {
            match BackendKind::parse(&value) {
                Some(backend) => self.backend = backend,
                None => tracing::warn!(value = %value, "Ignoring unknown MEMVAULT_BACKEND"),
            }
        }
        self.dynamo = self.dynamo.with_env_overrides_from(&lookup);
        self
    }

    /// Sets the backend kind.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the `DynamoDB` configuration.
    #[must_use]
    pub fn with_dynamo(mut self, dynamo: DynamoConfig) -> Self {
        self.dynamo = dynamo;
        self
    }

    /// Returns the configured log file path, if any.
    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file.as_ref().map(PathBuf::from)
    }
}
