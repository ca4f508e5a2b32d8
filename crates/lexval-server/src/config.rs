//! Configuration management for the lexval engine.
//!
//! Configuration is loaded from multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which take
//! precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use lexval_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("lexval.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//!
//! // Immutable runtime snapshot handed to the handler
//! let options = ValidationOptions::try_from(&config.validation)?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Upper bound for `validation.max_batch_size`.
pub const MAX_BATCH_SIZE_LIMIT: usize = 10_000;

/// Upper bound for `validation.batch_timeout_ms`.
pub const MAX_BATCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound for `validation.cache_expiration_secs`.
pub const MAX_CACHE_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Validation engine settings, in wire units.
///
/// Overridable with `LEXVAL_VALIDATION__<FIELD>`, e.g.
/// `LEXVAL_VALIDATION__MAX_BATCH_SIZE=200`.
///
/// ```yaml
/// validation:
///   max_batch_size: 1000
///   batch_timeout_ms: 30000
///   enable_parallel_processing: true
///   enable_caching: true
///   cache_expiration_secs: 300
///   parallel_threshold: 50
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ValidationSettings {
    /// Largest accepted request, counted after sanitizing.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Time budget for one top-level operation.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_parallel_processing: bool,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    #[serde(default = "default_cache_expiration_secs")]
    pub cache_expiration_secs: u64,

    /// Requests with at least this many ids run in parallel.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Average duration above which health is penalised.
    #[serde(default = "default_slow_operation_threshold_ms")]
    pub slow_operation_threshold_ms: u64,

    /// Samples kept per operation kind.
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,

    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            enable_parallel_processing: true,
            enable_caching: true,
            cache_expiration_secs: default_cache_expiration_secs(),
            parallel_threshold: default_parallel_threshold(),
            slow_operation_threshold_ms: default_slow_operation_threshold_ms(),
            metrics_window: default_metrics_window(),
            cache_max_capacity: default_cache_max_capacity(),
        }
    }
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_batch_timeout_ms() -> u64 {
    30_000
}

fn default_cache_expiration_secs() -> u64 {
    300
}

fn default_parallel_threshold() -> usize {
    50
}

fn default_slow_operation_threshold_ms() -> u64 {
    1000
}

fn default_metrics_window() -> usize {
    1000
}

fn default_cache_max_capacity() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres")
    pub database_url: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-query timeout enforced by the store itself.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_query_timeout() -> u64 {
    30
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `LEXVAL_` and use `__` as separator:
    /// - `LEXVAL_VALIDATION__PARALLEL_THRESHOLD=20` overrides `validation.parallel_threshold`
    /// - `LEXVAL_STORAGE__DATABASE_URL=...` overrides `storage.database_url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("LEXVAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from defaults and `LEXVAL_` environment variables.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("LEXVAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        ValidationOptions::try_from(&self.validation)?;

        let valid_backends = ["memory", "postgres"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }

        if self.storage.backend == "postgres"
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(invalid(
                "storage.database_url is required when backend is 'postgres'",
            ));
        }

        if self.storage.query_timeout_secs == 0 {
            return Err(invalid("storage.query_timeout_secs must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

/// Immutable runtime snapshot of the validation settings.
///
/// Build it through `TryFrom<&ValidationSettings>` (or `Default`) to get
/// range checking. The fields stay public so callers can override a few
/// settings with struct update syntax; such values are not re-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOptions {
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub enable_parallel_processing: bool,
    pub enable_caching: bool,
    pub cache_expiration: Duration,
    pub parallel_threshold: usize,
    pub slow_operation_threshold: Duration,
    pub metrics_window: usize,
    pub cache_max_capacity: u64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        let settings = ValidationSettings::default();
        Self {
            max_batch_size: settings.max_batch_size,
            batch_timeout: Duration::from_millis(settings.batch_timeout_ms),
            enable_parallel_processing: settings.enable_parallel_processing,
            enable_caching: settings.enable_caching,
            cache_expiration: Duration::from_secs(settings.cache_expiration_secs),
            parallel_threshold: settings.parallel_threshold,
            slow_operation_threshold: Duration::from_millis(settings.slow_operation_threshold_ms),
            metrics_window: settings.metrics_window,
            cache_max_capacity: settings.cache_max_capacity,
        }
    }
}

impl TryFrom<&ValidationSettings> for ValidationOptions {
    type Error = ConfigLoadError;

    fn try_from(settings: &ValidationSettings) -> Result<Self, Self::Error> {
        if !(1..=MAX_BATCH_SIZE_LIMIT).contains(&settings.max_batch_size) {
            return Err(invalid(format!(
                "validation.max_batch_size must be between 1 and {MAX_BATCH_SIZE_LIMIT}, got: {}",
                settings.max_batch_size
            )));
        }

        let batch_timeout = Duration::from_millis(settings.batch_timeout_ms);
        if batch_timeout.is_zero() || batch_timeout > MAX_BATCH_TIMEOUT {
            return Err(invalid(format!(
                "validation.batch_timeout_ms must be between 1 and {}, got: {}",
                MAX_BATCH_TIMEOUT.as_millis(),
                settings.batch_timeout_ms
            )));
        }

        if settings.parallel_threshold == 0 {
            return Err(invalid("validation.parallel_threshold must be at least 1"));
        }

        let cache_expiration = Duration::from_secs(settings.cache_expiration_secs);
        if cache_expiration.is_zero() || cache_expiration > MAX_CACHE_EXPIRATION {
            return Err(invalid(format!(
                "validation.cache_expiration_secs must be between 1 and {}, got: {}",
                MAX_CACHE_EXPIRATION.as_secs(),
                settings.cache_expiration_secs
            )));
        }

        if settings.metrics_window == 0 {
            return Err(invalid("validation.metrics_window must be at least 1"));
        }

        Ok(Self {
            max_batch_size: settings.max_batch_size,
            batch_timeout,
            enable_parallel_processing: settings.enable_parallel_processing,
            enable_caching: settings.enable_caching,
            cache_expiration,
            parallel_threshold: settings.parallel_threshold,
            slow_operation_threshold: Duration::from_millis(settings.slow_operation_threshold_ms),
            metrics_window: settings.metrics_window,
            cache_max_capacity: settings.cache_max_capacity,
        })
    }
}

impl ValidationOptions {
    /// Legal but suspicious settings. Each one costs health score.
    pub fn configuration_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.parallel_threshold > self.max_batch_size {
            issues.push(format!(
                "parallel_threshold ({}) exceeds max_batch_size ({}); parallel execution can never trigger",
                self.parallel_threshold, self.max_batch_size
            ));
        }
        if !self.enable_caching {
            issues.push("caching is disabled".to_string());
        }
        if self.batch_timeout < Duration::from_millis(100) {
            issues.push(format!(
                "batch_timeout ({}ms) is below 100ms",
                self.batch_timeout.as_millis()
            ));
        }
        if self.batch_timeout > Duration::from_secs(300) {
            issues.push(format!(
                "batch_timeout ({}s) is above 5 minutes",
                self.batch_timeout.as_secs()
            ));
        }
        if self.cache_expiration > Duration::from_secs(3600) {
            issues.push(format!(
                "cache_expiration ({}s) is above 1 hour",
                self.cache_expiration.as_secs()
            ));
        }
        if !self.enable_parallel_processing && self.max_batch_size >= 500 {
            issues.push(format!(
                "parallel processing is disabled with max_batch_size {}",
                self.max_batch_size
            ));
        }

        issues
    }
}
