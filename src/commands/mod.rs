pub mod admin;
pub mod serve;
pub mod worker;

// Re-export command functions for convenience
pub use admin::{shut_down_worker, status, topology, TopologyCommand};
pub use serve::serve;
pub use worker::worker;
