//! Integration tests module
//!
//! End-to-end tests for the topovisor cluster:
//! - The coordination contract, identical for memory, file and HTTP stores
//! - The HTTP service over a real socket
//! - Workers supervising scripted engine processes

pub mod fixtures;
pub mod http_roundtrip;
pub mod storage_contract;
pub mod worker_lifecycle;
