//! Coordination service configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::storage::FilePattern;

const DEFAULT_PORT: u16 = 8080;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

/// Configuration for the coordination service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// Directory of topology files loaded into the store at startup
    pub bootstrap_dir: Option<PathBuf>,

    /// File-name patterns for the bootstrap directory
    pub bootstrap_patterns: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_cors: true,
            enable_request_logging: true,
            bootstrap_dir: None,
            bootstrap_patterns: vec![FilePattern::DEFAULT.to_string()],
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_dir.is_some() && self.bootstrap_patterns.is_empty() {
            return Err(ConfigError::invalid(
                "bootstrap_patterns",
                "Bootstrap directory needs at least one pattern",
            ));
        }

        self.patterns()?;
        Ok(())
    }

    /// Compiled bootstrap patterns
    pub fn patterns(&self) -> Result<Vec<FilePattern>, ConfigError> {
        self.bootstrap_patterns
            .iter()
            .map(|p| {
                FilePattern::new(p)
                    .map_err(|e| ConfigError::invalid("bootstrap_patterns", e.to_string()))
            })
            .collect()
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_address: Option<SocketAddr>,
    enable_cors: Option<bool>,
    enable_request_logging: Option<bool>,
    bootstrap_dir: Option<PathBuf>,
    bootstrap_patterns: Option<Vec<String>>,
}

impl ServerConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(
            addr.parse()
                .map_err(|_| ConfigError::invalid("bind_address", format!("Invalid address: {addr}")))?,
        );
        Ok(self)
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Load topologies from this directory at startup
    pub fn bootstrap_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bootstrap_dir = Some(dir.into());
        self
    }

    /// Replace the bootstrap patterns
    pub fn bootstrap_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();
        let config = ServerConfig {
            bind_address: self.bind_address.unwrap_or(defaults.bind_address),
            enable_cors: self.enable_cors.unwrap_or(defaults.enable_cors),
            enable_request_logging: self
                .enable_request_logging
                .unwrap_or(defaults.enable_request_logging),
            bootstrap_dir: self.bootstrap_dir,
            bootstrap_patterns: self.bootstrap_patterns.unwrap_or(defaults.bootstrap_patterns),
        };

        config.validate()?;
        Ok(config)
    }
}
