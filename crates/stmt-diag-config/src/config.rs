// crates/stmt-diag-config/src/config.rs
// ============================================================================
// Module: Statement Diagnostics Configuration
// Description: Configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: stmt-diag-core, stmt-diag-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then the `STMT_DIAG_CONFIG` environment
//! variable, then `stmt-diag.toml` in the working directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use stmt_diag_core::DiagnosticsEventSink;
use stmt_diag_core::FileEventSink;
use stmt_diag_core::NoopEventSink;
use stmt_diag_core::PollerConfig;
use stmt_diag_core::RegistryConfig;
use stmt_diag_core::StderrEventSink;
use stmt_diag_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "stmt-diag.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "STMT_DIAG_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default reconciliation interval (ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
/// Smallest accepted reconciliation interval (ms).
const MIN_POLL_INTERVAL_MS: u64 = 100;
/// Largest accepted reconciliation interval (ms).
const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;
/// Largest accepted `SQLite` busy timeout (ms).
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level statement diagnostics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StmtDiagConfig {
    /// Durable store settings.
    pub store: SqliteStoreConfig,
    /// Registry timing.
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Event log sink.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StmtDiagConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        self.registry.validate()?;
        self.logging.validate()
    }
}

/// Registry timing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Interval between scheduled reconciliations.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// TTL attached to request notifications (zero means no expiry).
    #[serde(default)]
    pub broadcast_ttl_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            broadcast_ttl_ms: 0,
        }
    }
}

impl RegistrySettings {
    /// Returns the registry config derived from these settings.
    #[must_use]
    pub const fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            broadcast_ttl: Duration::from_millis(self.broadcast_ttl_ms),
        }
    }

    /// Returns the poller config, optionally bounded to `max_rounds` polls.
    #[must_use]
    pub const fn poller_config(&self, max_rounds: Option<u64>) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_rounds,
        }
    }

    /// Validates registry timing.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_POLL_INTERVAL_MS ..= MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "registry.poll_interval_ms must be within {MIN_POLL_INTERVAL_MS}..={MAX_POLL_INTERVAL_MS}"
            )));
        }
        Ok(())
    }
}

/// Returns the default reconciliation interval.
const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Event sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path (file sink only).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl LoggingConfig {
    /// Opens the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn open_sink(&self) -> Result<Arc<dyn DiagnosticsEventSink>, ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::Stderr, _) => Ok(Arc::new(StderrEventSink)),
            (LogSinkKind::None, _) => Ok(Arc::new(NoopEventSink)),
            (LogSinkKind::File, Some(path)) => {
                let sink = FileEventSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
        }
    }

    /// Validates sink settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSinkKind::File, Some(path)) => validate_path_field("logging.path", path),
            (LogSinkKind::Stderr | LogSinkKind::None, Some(_)) => Err(ConfigError::Invalid(
                "logging.path is only valid for the file sink".to_string(),
            )),
            (LogSinkKind::Stderr | LogSinkKind::None, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path.
fn validate_path_field(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates store settings.
fn validate_store(store: &SqliteStoreConfig) -> Result<(), ConfigError> {
    validate_path_field("store.path", &store.path)?;
    if store.busy_timeout_ms == 0 || store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "store.busy_timeout_ms must be within 1..={MAX_BUSY_TIMEOUT_MS}"
        )));
    }
    Ok(())
}
