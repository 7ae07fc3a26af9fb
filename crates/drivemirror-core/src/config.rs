//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub transfer: TransferConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root directory of the local mirror.
    pub root: PathBuf,
    /// Seconds between polling cycles in daemon mode.
    pub poll_interval: u64,
    /// Compute content hashes while scanning local files.
    pub hash_on_scan: bool,
}

/// Transfer engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Number of pending items fetched from the repository per batch.
    pub batch_size: u32,
    /// Maximum simultaneous transfers.
    pub max_concurrency: usize,
    /// Capacity of the work queue between the batch producer and the workers.
    pub queue_capacity: usize,
    /// Attempts per transfer before it is recorded as failed.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubled after each failed attempt.
    pub retry_base_delay_ms: u64,
    /// Upload chunk size in KiB (must be a multiple of 320).
    pub chunk_size_kib: usize,
}

/// State database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
}

/// Remote drive endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the Graph API.
    pub base_url: String,
    /// Environment variable that holds the bearer access token.
    pub access_token_env: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }
}

impl TransferConfig {
    /// Upload chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_kib * 1024
    }

    /// Base retry delay as a [`Duration`].
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("DriveMirror"),
            poll_interval: 60,
            hash_on_scan: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrency: 8,
            queue_capacity: 16,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            chunk_size_kib: 320,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("drivemirror")
                .join("state.db"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            access_token_env: "DRIVEMIRROR_ACCESS_TOKEN".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transfer.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Upload ranges must be multiples of this many KiB.
const CHUNK_ALIGNMENT_KIB: usize = 320;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- sync ---
        if self.sync.poll_interval == 0 {
            push("sync.poll_interval", "must be greater than 0".into());
        }
        if !self.sync.root.is_absolute() && !self.sync.root.starts_with("~") {
            push(
                "sync.root",
                format!("must be an absolute path: {}", self.sync.root.display()),
            );
        }

        // --- transfer ---
        if self.transfer.batch_size == 0 {
            push("transfer.batch_size", "must be greater than 0".into());
        }
        if self.transfer.max_concurrency == 0 || self.transfer.max_concurrency > 64 {
            push("transfer.max_concurrency", "must be in range 1..=64".into());
        }
        if self.transfer.queue_capacity == 0 {
            push("transfer.queue_capacity", "must be greater than 0".into());
        }
        if self.transfer.max_attempts == 0 {
            push("transfer.max_attempts", "must be greater than 0".into());
        }
        if self.transfer.chunk_size_kib == 0
            || self.transfer.chunk_size_kib % CHUNK_ALIGNMENT_KIB != 0
        {
            push(
                "transfer.chunk_size_kib",
                format!("must be a positive multiple of {CHUNK_ALIGNMENT_KIB}"),
            );
        }

        // --- remote ---
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            push(
                "remote.base_url",
                format!("must be an http(s) URL: {}", self.remote.base_url),
            );
        }
        if self.remote.access_token_env.trim().is_empty() {
            push("remote.access_token_env", "must not be empty".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/DriveMirror"))
///     .transfer_max_concurrency(4)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn sync_hash_on_scan(mut self, enabled: bool) -> Self {
        self.config.sync.hash_on_scan = enabled;
        self
    }

    // --- transfer ---

    pub fn transfer_batch_size(mut self, n: u32) -> Self {
        self.config.transfer.batch_size = n;
        self
    }

    pub fn transfer_max_concurrency(mut self, n: usize) -> Self {
        self.config.transfer.max_concurrency = n;
        self
    }

    pub fn transfer_queue_capacity(mut self, n: usize) -> Self {
        self.config.transfer.queue_capacity = n;
        self
    }

    pub fn transfer_max_attempts(mut self, n: u32) -> Self {
        self.config.transfer.max_attempts = n;
        self
    }

    pub fn transfer_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.transfer.retry_base_delay_ms = ms;
        self
    }

    pub fn transfer_chunk_size_kib(mut self, kib: usize) -> Self {
        self.config.transfer.chunk_size_kib = kib;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_access_token_env(mut self, name: impl Into<String>) -> Self {
        self.config.remote.access_token_env = name.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
