//! Coordination storage contract and its backends
//!
//! Every participant (workers, the HTTP service, the CLI) talks to the
//! coordination store only through [`CoordinationStorage`]. Three backends
//! implement it:
//!
//! - [`memory::MemoryStorage`] - in-process reference semantics
//! - [`file::FileStorage`] / [`file::FileCoordinator`] - bootstrap topologies from a directory
//! - [`crate::coordinator::HttpCoordinator`] - client of a remote [`crate::coordinator::CoordinationServer`]
//!
//! # Lazy sweeps
//!
//! Staleness is never detected by background timers. Reads that expose state
//! (`get_worker_status`, `get_topology_status`, `get_leadership_status`) first
//! reclassify stale records, so a sweep side effect is only observable after
//! such a read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    LeadershipStatus, Message, TopologyConfig, TopologyRecord, TopologyStatus, WorkerRecord,
    WorkerStatus,
};

pub mod file;
pub mod memory;
pub mod pattern;

pub use file::{scan_directory, FileCoordinator, FileStorage, TopologyFile};
pub use memory::MemoryStorage;
pub use pattern::FilePattern;

// ============================================================================
// Errors
// ============================================================================

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors returned by any storage backend
///
/// Domain variants are returned unchanged by the HTTP client, so callers cannot
/// tell a local backend from a remote one by the error they get back.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageError {
    /// No worker with this name
    #[error("Worker not found: {name}")]
    WorkerNotFound { name: String },

    /// No topology with this uuid
    #[error("Topology not found: {uuid}")]
    TopologyNotFound { uuid: String },

    /// Topology is running or waiting and cannot be replaced or deleted
    #[error("Topology {uuid} is {status}")]
    TopologyActive { uuid: String, status: TopologyStatus },

    /// Requested status change is not allowed from the current status
    #[error("Invalid transition for topology {uuid}: {from} -> {to}")]
    InvalidTransition {
        uuid: String,
        from: TopologyStatus,
        to: TopologyStatus,
    },

    /// Malformed request
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Network failure talking to a remote store
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// Filesystem failure
    #[error("I/O error during '{operation}': {reason}")]
    Io { operation: String, reason: String },

    /// A topology file could not be parsed
    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },
}

impl StorageError {
    pub fn worker_not_found(name: impl Into<String>) -> Self {
        Self::WorkerNotFound { name: name.into() }
    }

    pub fn topology_not_found(uuid: impl Into<String>) -> Self {
        Self::TopologyNotFound { uuid: uuid.into() }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Transport and file-system failures, as opposed to domain failures
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Io { .. })
    }

    /// Whether the next poll cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        self.is_transport()
    }
}

// ============================================================================
// Policy timeouts
// ============================================================================

/// Staleness thresholds used by the lazy sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTimeouts {
    /// An alive worker silent for longer than this is marked dead
    pub worker_liveness: Duration,

    /// A waiting topology not confirmed within this is unassigned again
    pub waiting_topology: Duration,

    /// A candidacy or leadership not refreshed within this expires
    pub leadership: Duration,
}

impl StorageTimeouts {
    pub const DEFAULT_WORKER_LIVENESS: Duration = Duration::from_secs(30);
    pub const DEFAULT_WAITING_TOPOLOGY: Duration = Duration::from_secs(30);
    pub const DEFAULT_LEADERSHIP: Duration = Duration::from_secs(10);
}

impl Default for StorageTimeouts {
    fn default() -> Self {
        Self {
            worker_liveness: Self::DEFAULT_WORKER_LIVENESS,
            waiting_topology: Self::DEFAULT_WAITING_TOPOLOGY,
            leadership: Self::DEFAULT_LEADERSHIP,
        }
    }
}

// ============================================================================
// Contract
// ============================================================================

/// The full state surface shared by workers, leader and administrators
///
/// Each call is atomic with respect to the records it touches: a failed call
/// leaves the store unchanged.
#[async_trait]
pub trait CoordinationStorage: Send + Sync {
    /// Upsert a worker; status becomes alive and leadership is cleared
    async fn register_worker(&self, name: &str) -> StorageResult<()>;

    /// All workers, after the defunct-worker and waiting-topology sweeps
    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>>;

    /// All topologies, after the defunct-worker and waiting-topology sweeps
    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>>;

    /// Topologies bound to `name`
    async fn get_topologies_for_worker(&self, name: &str) -> StorageResult<Vec<TopologyRecord>>;

    /// `Ok` if a leader exists, `Pending` if a candidate exists, else `Vacant`
    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus>;

    /// Become a candidate unless a leader or candidate already exists
    async fn announce_leader_candidacy(&self, name: &str) -> StorageResult<()>;

    /// Promote a pending candidate; true if `name` is (now) the leader
    async fn check_leader_candidacy(&self, name: &str) -> StorageResult<bool>;

    /// Queue a `start` message for `worker` and mark the topology waiting
    async fn assign_topology(&self, uuid: &str, worker: &str) -> StorageResult<()>;

    /// Apply a status report (`running`, `stopped` or `error`)
    async fn set_topology_status(
        &self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Direct status set; anything but alive also clears leadership
    async fn set_worker_status(&self, name: &str, status: WorkerStatus) -> StorageResult<()>;

    /// Ping `name` and drain every message queued for it
    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>>;

    /// Register (or re-register) a topology definition
    async fn register_topology(&self, uuid: &str, config: TopologyConfig) -> StorageResult<()>;

    /// Make a disabled or stopped topology eligible for assignment
    async fn enable_topology(&self, uuid: &str) -> StorageResult<()>;

    /// Take a topology out of rotation, stopping it if it runs
    async fn disable_topology(&self, uuid: &str) -> StorageResult<()>;

    /// Remove an inactive topology
    async fn delete_topology(&self, uuid: &str) -> StorageResult<()>;

    /// Ask the bound worker to stop a topology
    async fn stop_topology(&self, uuid: &str) -> StorageResult<()>;

    /// Move an errored topology back to unassigned
    async fn clear_topology_error(&self, uuid: &str) -> StorageResult<()>;

    /// Queue a worker-level shutdown
    async fn shut_down_worker(&self, name: &str) -> StorageResult<()>;

    /// Single topology lookup
    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord>;
}

/// Shared handle used by coordinator, leader and server
pub type SharedStorage = Arc<dyn CoordinationStorage>;
