//! HTTP coordination service tests over a real socket

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use topovisor::coordinator::{ClientConfig, HttpCoordinator};
use topovisor::models::TopologyStatus;
use topovisor::storage::{CoordinationStorage, MemoryStorage, SharedStorage, StorageError};

use super::fixtures::TestServer;
use crate::common::topology_config;

#[tokio::test]
async fn test_health_probes() {
    let server = TestServer::start(Arc::new(MemoryStorage::new())).await;
    let http = reqwest::Client::new();

    // Readiness flips once the listener is served; give it a moment
    let mut ready = false;
    for _ in 0..50 {
        let response = http
            .get(format!("{}/health/ready", server.base_url()))
            .send()
            .await
            .unwrap();
        if response.status().is_success() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready);

    let live = http
        .get(format!("{}/health/live", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_error_body_carries_kind() {
    let server = TestServer::start(Arc::new(MemoryStorage::new())).await;

    let response = reqwest::Client::new()
        .post(format!("{}/topology-info", server.base_url()))
        .json(&json!({ "uuid": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "topology_not_found");
    assert_eq!(body["uuid"], "missing");
    assert!(body["error"].as_str().unwrap().contains("missing"));

    server.stop().await;
}

#[tokio::test]
async fn test_client_and_server_share_state() {
    let backing: SharedStorage = Arc::new(MemoryStorage::new());
    let server = TestServer::start(Arc::clone(&backing)).await;
    let client = server.client();

    client
        .register_topology("t1", topology_config("t1"))
        .await
        .unwrap();
    client.enable_topology("t1").await.unwrap();

    // Written through HTTP, visible in the backing store
    let record = backing.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Unassigned);
    assert_eq!(record.config, topology_config("t1"));

    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let client = HttpCoordinator::new(
        ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let err = client.get_worker_status().await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(err, StorageError::Transport { .. }));
}
