//! HTTP coordination service
//!
//! Exposes a coordination store over HTTP so that workers on other hosts share
//! one view of workers, topologies and leadership.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  POST /get-messages   ┌──────────────────────────────┐
//! │  worker A    │ ────────────────────► │     Coordination Server      │
//! │ HttpCoordinator                      │                              │
//! └──────────────┘                       │  ┌────────────────────────┐  │
//!                                        │  │     MemoryStorage      │  │
//! ┌──────────────┐  POST /assign-topology│  │  - workers             │  │
//! │  worker B    │ ────────────────────► │  │  - topologies          │  │
//! │  (leader)    │                       │  │  - message queue       │  │
//! └──────────────┘                       │  └────────────────────────┘  │
//!                                        │                              │
//! ┌──────────────┐  POST /register-...   │  GET /health/live            │
//! │  topovisor   │ ────────────────────► │  GET /health/ready           │
//! │  CLI         │                       │  GET /metrics                │
//! └──────────────┘                       └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use topovisor::coordinator::{CoordinationServer, ServerConfig};
//!
//! let server = CoordinationServer::from_config(ServerConfig::default()).await?;
//! server.start().await?;
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod health;
pub mod server;

pub use client::{ClientConfig, ClientError, HttpCoordinator};
pub use config::ServerConfig;
pub use server::{CoordinationServer, ServerError};
