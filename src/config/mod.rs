//! Configuration management for topovisor
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags override individual fields in
//! `main.rs`.
//!
//! ```toml
//! [worker]
//! name = "worker-a"
//! poll_interval_ms = 2000
//! engine_command = "topology-engine"
//!
//! [storage]
//! kind = "http"
//! url = "http://coordinator:8080"
//!
//! [server]
//! bind_address = "0.0.0.0:8080"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::coordinator::{ClientConfig, HttpCoordinator, ServerConfig};
use crate::storage::{
    FileCoordinator, FilePattern, FileStorage, MemoryStorage, SharedStorage, StorageError,
};
use crate::worker::WorkerSettings;

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker process settings
    pub worker: WorkerConfig,

    /// Which coordination backend to use
    pub storage: StorageConfig,

    /// HTTP coordination service settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Unique worker name; generated when empty
    pub name: String,

    /// Message poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Leader tick interval in milliseconds
    pub leader_interval_ms: u64,

    /// Dataflow engine executable
    pub engine_command: String,

    /// Extra arguments passed to the engine
    pub engine_args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            poll_interval_ms: 2000,
            leader_interval_ms: 3000,
            engine_command: String::from("topology-engine"),
            engine_args: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Configured name, or a fresh `worker-<uuid>` when none is set
    pub fn resolved_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("worker-{}", uuid::Uuid::new_v4().simple())
        } else {
            self.name.clone()
        }
    }

    /// Runtime settings for a worker
    pub fn to_settings(&self) -> Result<WorkerSettings, ConfigError> {
        WorkerSettings::builder()
            .name(self.resolved_name())
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .leader_interval(Duration::from_millis(self.leader_interval_ms))
            .engine(self.engine_command.clone(), self.engine_args.clone())
            .build()
    }
}

/// Coordination backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// In-process store (single node)
    #[default]
    Memory,

    /// In-process store seeded from a topology directory
    File,

    /// Start messages straight from a topology directory, no coordination
    FileStub,

    /// Remote coordination service
    Http,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::FileStub => "file-stub",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "file-stub" | "file_stub" => Ok(Self::FileStub),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::invalid(
                "storage.kind",
                format!("unknown storage kind '{other}' (memory, file, file-stub, http)"),
            )),
        }
    }
}

/// Coordination backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub kind: StorageKind,

    /// Base URL of the coordination service (`http`)
    pub url: Option<String>,

    /// Topology directory (`file`, `file-stub`)
    pub dir: Option<PathBuf>,

    /// File-name patterns selecting topology files
    pub patterns: Vec<String>,

    /// Per-request timeout for the HTTP client in seconds
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            url: None,
            dir: None,
            patterns: vec![FilePattern::DEFAULT.to_string()],
            request_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    /// Compile the configured file patterns
    pub fn file_patterns(&self) -> Result<Vec<FilePattern>, ConfigError> {
        self.patterns
            .iter()
            .map(|p| {
                FilePattern::new(p).map_err(|e| ConfigError::invalid("storage.patterns", e.to_string()))
            })
            .collect()
    }

    /// Build the configured backend
    pub async fn connect(&self) -> crate::error::Result<SharedStorage> {
        self.validate()?;

        let storage: SharedStorage = match self.kind {
            StorageKind::Memory => Arc::new(MemoryStorage::new()),
            StorageKind::File => {
                let dir = self.dir.clone().ok_or_else(|| ConfigError::missing("storage.dir"))?;
                Arc::new(FileStorage::open(dir, &self.file_patterns()?).await?)
            }
            StorageKind::FileStub => {
                let dir = self.dir.clone().ok_or_else(|| ConfigError::missing("storage.dir"))?;
                Arc::new(FileCoordinator::open(dir, &self.file_patterns()?).await?)
            }
            StorageKind::Http => {
                let url = self.url.clone().ok_or_else(|| ConfigError::missing("storage.url"))?;
                let client_config = ClientConfig::new(url)
                    .with_timeout(Duration::from_secs(self.request_timeout_secs));
                Arc::new(HttpCoordinator::new(client_config).map_err(StorageError::from)?)
            }
        };

        tracing::info!(kind = %self.kind, "Coordination storage ready");
        Ok(storage)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            StorageKind::Memory => {}
            StorageKind::File | StorageKind::FileStub => {
                if self.dir.is_none() {
                    return Err(ConfigError::missing("storage.dir"));
                }
                if self.patterns.is_empty() {
                    return Err(ConfigError::invalid(
                        "storage.patterns",
                        "at least one pattern is required",
                    ));
                }
                self.file_patterns()?;
            }
            StorageKind::Http => {
                let url = self.url.as_deref().ok_or_else(|| ConfigError::missing("storage.url"))?;
                url::Url::parse(url)
                    .map_err(|e| ConfigError::invalid("storage.url", e.to_string()))?;
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "storage.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment-shaped)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup("TOPOVISOR_WORKER_NAME") {
            config.worker.name = name;
        }
        if let Some(v) = lookup("TOPOVISOR_POLL_INTERVAL_MS") {
            config.worker.poll_interval_ms = parse_number("TOPOVISOR_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("TOPOVISOR_LEADER_INTERVAL_MS") {
            config.worker.leader_interval_ms = parse_number("TOPOVISOR_LEADER_INTERVAL_MS", &v)?;
        }
        if let Some(cmd) = lookup("TOPOVISOR_ENGINE_COMMAND") {
            config.worker.engine_command = cmd;
        }
        if let Some(args) = lookup("TOPOVISOR_ENGINE_ARGS") {
            config.worker.engine_args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(kind) = lookup("TOPOVISOR_STORAGE") {
            config.storage.kind = kind.parse()?;
        }
        config.storage.url = lookup("TOPOVISOR_STORAGE_URL").or(config.storage.url);
        config.storage.dir = lookup("TOPOVISOR_STORAGE_DIR")
            .map(PathBuf::from)
            .or(config.storage.dir);
        if let Some(patterns) = lookup("TOPOVISOR_STORAGE_PATTERNS") {
            config.storage.patterns = split_list(&patterns);
        }

        if let Some(addr) = lookup("TOPOVISOR_BIND_ADDRESS") {
            config.server.bind_address = addr
                .parse()
                .map_err(|_| ConfigError::invalid("TOPOVISOR_BIND_ADDRESS", format!("Invalid address: {addr}")))?;
        }
        config.server.bootstrap_dir = lookup("TOPOVISOR_BOOTSTRAP_DIR")
            .map(PathBuf::from)
            .or(config.server.bootstrap_dir);

        if let Some(level) = lookup("TOPOVISOR_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("TOPOVISOR_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: String::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("worker.poll_interval_ms", "must be greater than 0"));
        }
        if self.worker.leader_interval_ms == 0 {
            return Err(ConfigError::invalid("worker.leader_interval_ms", "must be greater than 0"));
        }
        if self.worker.engine_command.trim().is_empty() {
            return Err(ConfigError::missing("worker.engine_command"));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("'{}' is not one of text, json", self.logging.format),
            ));
        }

        self.storage.validate()?;
        self.server.validate()?;
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}

fn parse_number(field: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, format!("'{value}' is not a number")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
