//! topovisor - distributed stream-topology orchestrator
//!
//! Topologies (dataflow definitions) are registered in a coordination store.
//! A cluster of workers elects a leader, the leader places topologies on the
//! least-loaded alive workers, and each worker runs one engine child process
//! per topology it owns.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Worker, topology, message and leadership records
//! - [`storage`] - The coordination contract and its memory/file backends
//! - [`coordinator`] - HTTP service exposing the contract, and its client
//! - [`scheduler`] - Least-loaded topology placement
//! - [`worker`] - Coordinator, leader, engine proxy and local supervisor
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use topovisor::config::Config;
//! use topovisor::worker::{PassthroughCompiler, TopologyWorker};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = config.storage.connect().await?;
//!     let worker = TopologyWorker::new(
//!         config.worker.to_settings()?,
//!         storage,
//!         Arc::new(PassthroughCompiler),
//!     );
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use error::{Error, ErrorCategory, Result, TopovisorErrorTrait};
