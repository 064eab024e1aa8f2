//! Configuration module for UbiqBridge.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::SearchScope;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for UbiqBridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub containers: ContainersConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

/// Where containers live for the local directory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// Directory holding one sub-directory per container id.
    pub root: PathBuf,
    /// When false, every container resolution fails as if signed out.
    pub signed_in: bool,
}

/// Metadata query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Scopes searched by every query: `data`, `documents`.
    pub search_scopes: Vec<String>,
    /// Capacity of each subscription's notification channel.
    pub notification_buffer: usize,
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
    /// Typically `$XDG_CONFIG_HOME/ubiq/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("ubiq")
            .join("config.yaml")
    }

    /// Parsed search scopes, skipping names that fail to parse.
    ///
    /// Run [`Config::validate`] first to surface bad names.
    pub fn search_scopes(&self) -> Vec<SearchScope> {
        self.query
            .search_scopes
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("ubiq")
                .join("containers"),
            signed_in: true,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_scopes: SearchScope::ALL.iter().map(ToString::to_string).collect(),
            notification_buffer: 64,
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
    /// Dotted path to the offending field, e.g. `"query.search_scopes"`.
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

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- containers ---
        let root_str = self.containers.root.to_string_lossy();
        if !root_str.starts_with('~') && !self.containers.root.is_absolute() {
            errors.push(ValidationError {
                field: "containers.root".into(),
                message: format!("must be an absolute path: {}", self.containers.root.display()),
            });
        }

        // --- query ---
        if self.query.search_scopes.is_empty() {
            errors.push(ValidationError {
                field: "query.search_scopes".into(),
                message: "at least one scope is required".into(),
            });
        }
        for scope in &self.query.search_scopes {
            if scope.parse::<SearchScope>().is_err() {
                errors.push(ValidationError {
                    field: "query.search_scopes".into(),
                    message: format!("unknown scope '{scope}'; valid options: data, documents"),
                });
            }
        }
        if self.query.notification_buffer == 0 {
            errors.push(ValidationError {
                field: "query.notification_buffer".into(),
                message: "must be greater than 0".into(),
            });
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
/// use ubiq_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .containers_root(PathBuf::from("/srv/ubiq/containers"))
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

    // --- containers ---

    pub fn containers_root(mut self, root: PathBuf) -> Self {
        self.config.containers.root = root;
        self
    }

    pub fn signed_in(mut self, signed_in: bool) -> Self {
        self.config.containers.signed_in = signed_in;
        self
    }

    // --- query ---

    pub fn search_scopes(mut self, scopes: &[SearchScope]) -> Self {
        self.config.query.search_scopes = scopes.iter().map(ToString::to_string).collect();
        self
    }

    pub fn notification_buffer(mut self, capacity: usize) -> Self {
        self.config.query.notification_buffer = capacity;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
