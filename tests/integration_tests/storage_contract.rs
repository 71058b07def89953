//! Coordination contract tests
//!
//! The same scenario runs against every backend that implements the full
//! contract: memory, file (bootstrapped) and HTTP (client + server).

use std::sync::Arc;

use topovisor::models::{LeadershipStatus, MessageCommand, MessageContent, TopologyStatus, WorkerStatus};
use topovisor::storage::{
    CoordinationStorage, FileCoordinator, FilePattern, FileStorage, MemoryStorage, SharedStorage,
    StorageError,
};

use super::fixtures::TestServer;
use crate::common::topology_config;

// ============================================================================
// Scenario
// ============================================================================

async fn contract_scenario(storage: SharedStorage) {
    // Registration
    storage.register_worker("w1").await.unwrap();
    storage.register_worker("w2").await.unwrap();
    let workers = storage.get_worker_status().await.unwrap();
    assert_eq!(workers.len(), 2);
    assert!(workers.iter().all(|w| w.status == WorkerStatus::Alive));

    // Leadership
    assert_eq!(storage.get_leadership_status().await.unwrap(), LeadershipStatus::Vacant);
    storage.announce_leader_candidacy("w1").await.unwrap();
    assert_eq!(storage.get_leadership_status().await.unwrap(), LeadershipStatus::Pending);
    storage.announce_leader_candidacy("w2").await.unwrap();
    assert!(!storage.check_leader_candidacy("w2").await.unwrap());
    assert!(storage.check_leader_candidacy("w1").await.unwrap());
    assert_eq!(storage.get_leadership_status().await.unwrap(), LeadershipStatus::Ok);

    // A new topology is disabled and cannot be assigned
    storage
        .register_topology("t1", topology_config("t1"))
        .await
        .unwrap();
    assert_eq!(
        storage.get_topology_info("t1").await.unwrap().status,
        TopologyStatus::Disabled
    );
    assert!(matches!(
        storage.assign_topology("t1", "w2").await,
        Err(StorageError::InvalidTransition { .. })
    ));

    // Enable, assign, deliver
    storage.enable_topology("t1").await.unwrap();
    storage.assign_topology("t1", "w2").await.unwrap();
    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Waiting);
    assert_eq!(record.worker.as_deref(), Some("w2"));
    assert_eq!(storage.get_topologies_for_worker("w2").await.unwrap().len(), 1);
    assert!(matches!(
        storage.assign_topology("t1", "w1").await,
        Err(StorageError::TopologyActive { .. })
    ));

    let messages = storage.get_messages("w2").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].cmd, MessageCommand::Start);
    assert!(matches!(
        &messages[0].content,
        MessageContent::Start { uuid, .. } if uuid == "t1"
    ));
    assert!(storage.get_messages("w2").await.unwrap().is_empty());

    // Running topologies are protected
    storage
        .set_topology_status("t1", TopologyStatus::Running, None)
        .await
        .unwrap();
    assert!(matches!(
        storage.delete_topology("t1").await,
        Err(StorageError::TopologyActive { .. })
    ));
    assert!(matches!(
        storage.register_topology("t1", topology_config("t1")).await,
        Err(StorageError::TopologyActive { .. })
    ));

    // Stop goes through the bound worker
    storage.stop_topology("t1").await.unwrap();
    let messages = storage.get_messages("w2").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].cmd, MessageCommand::StopTopology);
    storage
        .set_topology_status("t1", TopologyStatus::Stopped, None)
        .await
        .unwrap();
    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Stopped);
    assert_eq!(record.worker, None);

    // Error and recovery
    storage.enable_topology("t1").await.unwrap();
    storage.assign_topology("t1", "w1").await.unwrap();
    storage
        .set_topology_status("t1", TopologyStatus::Error, Some("boom"))
        .await
        .unwrap();
    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Error);
    assert_eq!(record.error.as_deref(), Some("boom"));
    assert_eq!(record.worker, None);
    storage.clear_topology_error("t1").await.unwrap();
    assert_eq!(
        storage.get_topology_info("t1").await.unwrap().status,
        TopologyStatus::Unassigned
    );

    // Removal drops the undelivered start for w1 too
    storage.disable_topology("t1").await.unwrap();
    storage.delete_topology("t1").await.unwrap();
    assert!(matches!(
        storage.get_topology_info("t1").await,
        Err(StorageError::TopologyNotFound { .. })
    ));

    // Worker shutdown
    storage.shut_down_worker("w1").await.unwrap();
    let messages = storage.get_messages("w1").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].cmd, MessageCommand::Shutdown);

    // A dead leader leaves leadership vacant
    storage.set_worker_status("w1", WorkerStatus::Dead).await.unwrap();
    assert_eq!(storage.get_leadership_status().await.unwrap(), LeadershipStatus::Vacant);
}

// ============================================================================
// Backends
// ============================================================================

#[tokio::test]
async fn test_memory_backend_contract() {
    contract_scenario(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_file_backend_contract() {
    let dir = tempfile::tempdir().unwrap();
    let patterns = [FilePattern::new(FilePattern::DEFAULT).unwrap()];
    let storage = FileStorage::open(dir.path(), &patterns).await.unwrap();
    contract_scenario(Arc::new(storage)).await;
}

#[tokio::test]
async fn test_http_backend_contract() {
    let server = TestServer::start(Arc::new(MemoryStorage::new())).await;
    contract_scenario(server.client()).await;
    server.stop().await;
}

// ============================================================================
// File bootstrap
// ============================================================================

#[tokio::test]
async fn test_file_backend_enables_bootstrapped_topologies() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("clicks.json"),
        serde_json::to_string(&topology_config("clicks")).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a topology").unwrap();

    let patterns = [FilePattern::new(FilePattern::DEFAULT).unwrap()];
    let storage = FileStorage::open(dir.path(), &patterns).await.unwrap();

    let topologies = storage.get_topology_status().await.unwrap();
    assert_eq!(topologies.len(), 1);
    assert_eq!(topologies[0].uuid, "clicks");
    assert_eq!(topologies[0].status, TopologyStatus::Unassigned);
}

#[tokio::test]
async fn test_file_stub_hands_out_each_file_once() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b"] {
        std::fs::write(
            dir.path().join(format!("{name}.json")),
            serde_json::to_string(&topology_config(name)).unwrap(),
        )
        .unwrap();
    }

    let patterns = [FilePattern::new(FilePattern::DEFAULT).unwrap()];
    let stub = FileCoordinator::open(dir.path(), &patterns).await.unwrap();

    let messages = stub.get_messages("local").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.worker == "local" && m.cmd == MessageCommand::Start));
    assert!(stub.get_messages("local").await.unwrap().is_empty());
    assert_eq!(stub.get_leadership_status().await.unwrap(), LeadershipStatus::Ok);
}
