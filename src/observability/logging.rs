//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Filter used when neither the environment nor the config file sets one.
pub const DEFAULT_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the logging configuration from file settings and the process
    /// environment.
    ///
    /// Environment variables take precedence:
    /// - `MEMVAULT_LOG`, then `RUST_LOG`: filter directive
    /// - `MEMVAULT_LOG_FORMAT`: "pretty" or "json"
    /// - `MEMVAULT_LOG_FILE`: log file path
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>) -> Self {
        Self::from_settings_with(settings, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`], reading variables through `lookup`.
    #[must_use]
    pub fn from_settings_with<F>(settings: Option<&LoggingSettings>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = settings.format.as_deref() {
                config.apply_format(format);
            }
            if let Some(filter) = &settings.filter {
                config.filter.clone_from(filter);
            }
            if let Some(file) = &settings.file {
                config.file = Some(PathBuf::from(file));
            }
        }

        if let Some(filter) = lookup("MEMVAULT_LOG").or_else(|| lookup("RUST_LOG")) {
            config.filter = filter;
        }
        if let Some(format) = lookup("MEMVAULT_LOG_FORMAT") {
            config.apply_format(&format);
        }
        if let Some(file) = lookup("MEMVAULT_LOG_FILE").filter(|f| !f.trim().is_empty()) {
            config.file = Some(PathBuf::from(file));
        }

        config
    }

    fn apply_format(&mut self, format: &str) {
        // No subscriber exists yet to report an unknown name; keep the current format.
        if let Some(parsed) = LogFormat::parse(format) {
            self.format = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", Some(LogFormat::Json) ; "json")]
    #[test_case("PRETTY", Some(LogFormat::Pretty) ; "pretty upper")]
    #[test_case("text", Some(LogFormat::Pretty) ; "text alias")]
    #[test_case("xml", None ; "unknown")]
    fn test_log_format_parse(input: &str, expected: Option<LogFormat>) {
        assert_eq!(LogFormat::parse(input), expected);
    }

    #[test]
    fn test_defaults_without_settings() {
        let config = LoggingConfig::from_settings_with(None, |_| None);
        assert_eq!(config, LoggingConfig::default());
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn test_settings_are_applied() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("memvault=trace".to_string()),
            file: Some("/var/log/memvault.log".to_string()),
        };
        let config = LoggingConfig::from_settings_with(Some(&settings), |_| None);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "memvault=trace");
        assert_eq!(config.file, Some(PathBuf::from("/var/log/memvault.log")));
    }

    #[test]
    fn test_env_wins_over_settings() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("warn".to_string()),
            file: None,
        };
        let config = LoggingConfig::from_settings_with(Some(&settings), |key| match key {
            "MEMVAULT_LOG" => Some("debug".to_string()),
            "RUST_LOG" => Some("error".to_string()),
            "MEMVAULT_LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_rust_log_is_fallback_filter() {
        let config = LoggingConfig::from_settings_with(None, |key| {
            (key == "RUST_LOG").then(|| "memvault=debug".to_string())
        });
        assert_eq!(config.filter, "memvault=debug");
    }
}
