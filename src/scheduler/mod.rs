//! Topology placement
//!
//! The leader decides where unassigned topologies run. Placement is a plain
//! least-loaded greedy choice:
//!
//! ```text
//!   alive workers + their running/waiting counts
//!                     │
//!              ┌──────▼───────┐
//!              │ LoadBalancer │  next() = lightest, ties by name
//!              └──────┬───────┘
//!                     │
//!   unassigned topologies (uuid order) ──► Vec<Assignment>
//! ```
//!
//! - [`balancer`] - [`LoadBalancer`]
//! - [`planner`] - [`plan_assignments`]

pub mod balancer;
pub mod planner;

pub use balancer::{BalancerError, LoadBalancer, WorkerLoad};
pub use planner::{plan_assignments, Assignment};
