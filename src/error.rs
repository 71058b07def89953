//! Unified error handling for the topovisor crate
//!
//! Each module keeps its own error type. [`Error`] wraps them all so callers
//! crossing module boundaries (the CLI, mostly) can use a single `Result`.
//!
//! # Architecture
//!
//! - [`TopovisorErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use topovisor::error::{Error, TopovisorErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::coordinator::{ClientError, ServerError};
pub use crate::scheduler::BalancerError;
pub use crate::storage::StorageError;
pub use crate::worker::{CompileError, ProxyError, WorkerError};

/// Common trait for topovisor error types
pub trait TopovisorErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The store could not be reached
    Transport,
    /// The store rejected the request
    Domain,
    /// Engine child process failures
    Process,
    /// Configuration and validation errors
    Config,
    /// Local file and socket errors
    Io,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the topovisor crate
#[derive(Error, Debug)]
pub enum Error {
    /// Coordination store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP store client errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// HTTP store server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Worker supervision errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Engine process errors
    #[error("Engine error: {0}")]
    Proxy(#[from] ProxyError),

    /// Topology compilation errors
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Placement errors
    #[error("Balancer error: {0}")]
    Balancer(#[from] BalancerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TopovisorErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_recoverable(),
            Self::Client(e) => matches!(e, ClientError::Network(_)),
            Self::Worker(WorkerError::Storage(e)) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Server(_)
            | Self::Config(_)
            | Self::Worker(_)
            | Self::Proxy(_)
            | Self::Compile(_)
            | Self::Balancer(_)
            | Self::Json(_)
            | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(e) | Self::Worker(WorkerError::Storage(e)) => storage_category(e),
            Self::Client(_) => ErrorCategory::Transport,
            Self::Server(ServerError::Config(_)) | Self::Config(_) => ErrorCategory::Config,
            Self::Server(ServerError::Storage(e)) => storage_category(e),
            Self::Server(_) | Self::Io(_) => ErrorCategory::Io,
            Self::Worker(_) | Self::Proxy(_) | Self::Compile(_) => ErrorCategory::Process,
            Self::Balancer(_) => ErrorCategory::Domain,
            Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

fn storage_category(err: &StorageError) -> ErrorCategory {
    match err {
        StorageError::Transport { .. } => ErrorCategory::Transport,
        StorageError::Io { .. } | StorageError::Parse { .. } => ErrorCategory::Io,
        _ => ErrorCategory::Domain,
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config(ConfigError::invalid(field, reason))
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::from(StorageError::transport("connection refused"));
        assert_eq!(err.category(), ErrorCategory::Transport);

        let err = Error::from(StorageError::topology_not_found("t1"));
        assert_eq!(err.category(), ErrorCategory::Domain);

        let err = Error::from(ProxyError::ChildExited { code: Some(1) });
        assert_eq!(err.category(), ErrorCategory::Process);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::from(StorageError::transport("timeout")).is_recoverable());
        assert!(!Error::from(StorageError::worker_not_found("w1")).is_recoverable());
        assert!(Error::from(WorkerError::Storage(StorageError::transport("timeout"))).is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("worker.poll_interval_ms", "must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::with_source(
            "Failed to read topology",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Failed to read topology");
        assert!(std::error::Error::source(&err).is_some());
    }
}
