//! Worker side of the cluster
//!
//! A worker process is built from four pieces:
//!
//! ```text
//!                 ┌─────────────────────────────────────────┐
//!                 │             TopologyWorker              │
//!                 │  events ◄── TopologyCoordinator ──┐     │
//!                 │                  │                │     │
//!                 │           TopologyLeader          │     │
//!                 │                                   │     │
//!                 │  TopologyLocalProxy x N ── exits ─┘     │
//!                 └───────────────┬─────────────────────────┘
//!                                 │ CoordinationStorage
//!                                 ▼
//!                     memory / file / HTTP store
//! ```
//!
//! - [`coordinator`] - registration, message polling and status reports
//! - [`leader`] - leadership election and topology placement
//! - [`proxy`] - one engine child process per topology
//! - [`topology_worker`] - supervision of all local engines
//! - [`compiler`] - definition compilation seam
//! - [`settings`] - worker settings

pub mod compiler;
pub mod coordinator;
pub mod leader;
pub mod proxy;
pub mod settings;
pub mod topology_worker;

pub use compiler::{CompileError, PassthroughCompiler, TopologyCompiler};
pub use coordinator::{CoordinatorEvent, TopologyCoordinator};
pub use leader::{LeaderTick, TopologyLeader};
pub use proxy::{ProxyError, ProxyExit, ProxyVerb, TopologyLocalProxy};
pub use settings::{EngineCommand, WorkerSettings, WorkerSettingsBuilder};
pub use topology_worker::{TopologyWorker, WorkerError};
