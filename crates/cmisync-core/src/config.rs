//! Configuration module for CmisSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for one synchronized tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub repository: RepositoryConfig,
    pub filters: FiltersConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root directory of the local tree.
    pub root: PathBuf,
    /// Seconds between remote change log polls.
    pub poll_interval: u64,
    /// Milliseconds a local path must stay quiet before its change is queued.
    pub debounce_delay: u64,
    /// Maximum number of change log entries requested per page (1..=1000).
    pub change_log_page_size: u32,
    /// Path to the SQLite metadata database.
    pub database: PathBuf,
}

/// Remote repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Service endpoint of the repository. `None` until configured.
    pub url: Option<String>,
    /// Repository identifier on the server.
    pub repository_id: Option<String>,
    /// Remote identifier of the folder mapped to `sync.root`.
    pub remote_folder_id: Option<String>,
}

/// Ignore rules applied before any event reaches the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Glob patterns matched against file and folder names.
    pub ignored_names: Vec<String>,
    /// Whether names starting with a dot are skipped.
    pub ignore_hidden: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
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
    /// Typically `$XDG_CONFIG_HOME/cmisync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cmisync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("cmisync");
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("CmisSync"),
            poll_interval: 30,
            debounce_delay: 500,
            change_log_page_size: 100,
            database: data_dir.join("cmisync.db"),
        }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            ignored_names: Vec::new(),
            ignore_hidden: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
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

/// Largest page the change log poller will request.
pub const MAX_CHANGE_LOG_PAGE_SIZE: u32 = 1000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.poll_interval == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.change_log_page_size == 0
            || self.sync.change_log_page_size > MAX_CHANGE_LOG_PAGE_SIZE
        {
            errors.push(ValidationError {
                field: "sync.change_log_page_size".into(),
                message: format!("must be in range 1..={MAX_CHANGE_LOG_PAGE_SIZE}"),
            });
        }

        // Check sync root only when it does not start with `~` (tilde is expanded at runtime).
        let root_str = self.sync.root.to_string_lossy();
        if !root_str.starts_with('~') && !self.sync.root.exists() {
            errors.push(ValidationError {
                field: "sync.root".into(),
                message: format!("directory does not exist: {}", self.sync.root.display()),
            });
        }
        if self.sync.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "sync.database".into(),
                message: "must not be empty".into(),
            });
        }

        // --- repository ---
        if let Some(url) = &self.repository.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: "repository.url".into(),
                    message: format!("must be an http(s) URL, got '{url}'"),
                });
            }
        }
        if matches!(&self.repository.remote_folder_id, Some(id) if id.trim().is_empty()) {
            errors.push(ValidationError {
                field: "repository.remote_folder_id".into(),
                message: "must not be empty when set".into(),
            });
        }

        // --- filters ---
        for pattern in &self.filters.ignored_names {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ValidationError {
                    field: "filters.ignored_names".into(),
                    message: format!("invalid pattern '{pattern}': {e}"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
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
/// use cmisync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/Documents"))
///     .sync_poll_interval(60)
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

    pub fn sync_debounce_delay(mut self, millis: u64) -> Self {
        self.config.sync.debounce_delay = millis;
        self
    }

    pub fn sync_change_log_page_size(mut self, size: u32) -> Self {
        self.config.sync.change_log_page_size = size;
        self
    }

    pub fn sync_database(mut self, database: PathBuf) -> Self {
        self.config.sync.database = database;
        self
    }

    // --- repository ---

    pub fn repository_url(mut self, url: impl Into<String>) -> Self {
        self.config.repository.url = Some(url.into());
        self
    }

    pub fn repository_id(mut self, id: impl Into<String>) -> Self {
        self.config.repository.repository_id = Some(id.into());
        self
    }

    pub fn remote_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.repository.remote_folder_id = Some(id.into());
        self
    }

    // --- filters ---

    pub fn ignored_name(mut self, pattern: impl Into<String>) -> Self {
        self.config.filters.ignored_names.push(pattern.into());
        self
    }

    pub fn ignore_hidden(mut self, ignore: bool) -> Self {
        self.config.filters.ignore_hidden = ignore;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
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
