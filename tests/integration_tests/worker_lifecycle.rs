//! Worker lifecycle tests
//!
//! Workers supervise real child processes here: small `sh` scripts that speak
//! the engine protocol.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use topovisor::models::{TopologyStatus, WorkerStatus};
use topovisor::storage::{FileCoordinator, FilePattern, SharedStorage};

use super::fixtures::{
    spawn_worker, SlowRunningReports, TestServer, CRASHING_ENGINE, REJECTING_ENGINE,
    SHORT_LIVED_ENGINE, SLOW_INIT_ENGINE, WELL_BEHAVED_ENGINE,
};
use crate::common::{enabled_topologies, memory_storage, topology_config, wait_for_status};

async fn wait_for_exit(
    runner: tokio::task::JoinHandle<Result<(), topovisor::worker::WorkerError>>,
) {
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_topology_runs_stops_and_worker_shuts_down() {
    let storage = memory_storage();
    enabled_topologies(&storage, &["t1"]).await;

    let (worker, runner) = spawn_worker("w1", WELL_BEHAVED_ENGINE, &storage);

    wait_for_status(&storage, "t1", TopologyStatus::Running).await;
    assert_eq!(worker.tracked().await, vec!["t1"]);
    assert_eq!(
        storage.get_topology_info("t1").await.unwrap().worker.as_deref(),
        Some("w1")
    );

    // Stop through the store
    storage.stop_topology("t1").await.unwrap();
    wait_for_status(&storage, "t1", TopologyStatus::Stopped).await;
    assert!(worker.tracked().await.is_empty());

    // Run again, then shut the whole worker down
    storage.enable_topology("t1").await.unwrap();
    wait_for_status(&storage, "t1", TopologyStatus::Running).await;

    storage.shut_down_worker("w1").await.unwrap();
    wait_for_exit(runner).await;

    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Stopped);
    let workers = storage.get_worker_status().await.unwrap();
    assert_eq!(workers[0].status, WorkerStatus::Dead);
}

#[tokio::test]
async fn test_rejected_definition_reports_error() {
    let storage = memory_storage();
    enabled_topologies(&storage, &["t1"]).await;

    let (worker, runner) = spawn_worker("w1", REJECTING_ENGINE, &storage);

    wait_for_status(&storage, "t1", TopologyStatus::Error).await;
    let record = storage.get_topology_info("t1").await.unwrap();
    assert!(record.error.unwrap().contains("bad topology"));
    assert_eq!(record.worker, None);
    assert!(worker.tracked().await.is_empty());

    worker.request_shutdown();
    wait_for_exit(runner).await;
}

#[tokio::test]
async fn test_engine_crash_reports_stopped() {
    let storage = memory_storage();
    enabled_topologies(&storage, &["t1"]).await;

    let (worker, runner) = spawn_worker("w1", CRASHING_ENGINE, &storage);

    wait_for_status(&storage, "t1", TopologyStatus::Running).await;
    wait_for_status(&storage, "t1", TopologyStatus::Stopped).await;

    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.worker, None);
    assert_eq!(record.error, None);
    assert!(worker.tracked().await.is_empty());

    worker.request_shutdown();
    wait_for_exit(runner).await;
}

#[tokio::test]
async fn test_late_running_report_does_not_outlive_stop() {
    let backing = memory_storage();
    enabled_topologies(&backing, &["t1"]).await;
    let storage = SlowRunningReports::wrap(Arc::clone(&backing), Duration::from_millis(300));

    let (worker, runner) = spawn_worker("w1", SHORT_LIVED_ENGINE, &storage);

    wait_for_status(&backing, "t1", TopologyStatus::Stopped).await;
    assert!(worker.tracked().await.is_empty());

    // Well past the delayed report: still stopped and unbound
    tokio::time::sleep(Duration::from_millis(600)).await;
    let record = backing.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Stopped);
    assert_eq!(record.worker, None);

    worker.request_shutdown();
    wait_for_exit(runner).await;
}

#[tokio::test]
async fn test_shutdown_lets_starting_topology_settle() {
    let storage = memory_storage();
    enabled_topologies(&storage, &["t1"]).await;

    let (worker, runner) = spawn_worker("w1", SLOW_INIT_ENGINE, &storage);

    // Shut down while the engine is still in init
    tokio::time::timeout(Duration::from_secs(10), async {
        while worker.tracked().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    worker.request_shutdown();
    wait_for_exit(runner).await;

    let record = storage.get_topology_info("t1").await.unwrap();
    assert_eq!(record.status, TopologyStatus::Stopped);
    assert_eq!(record.error, None);
    assert_eq!(record.worker, None);
    assert!(worker.tracked().await.is_empty());

    let workers = storage.get_worker_status().await.unwrap();
    assert_eq!(workers[0].status, WorkerStatus::Dead);
}

#[tokio::test]
async fn test_leader_spreads_topologies_over_workers() {
    let storage = memory_storage();
    storage.register_worker("w1").await.unwrap();
    storage.register_worker("w2").await.unwrap();
    enabled_topologies(&storage, &["t1", "t2"]).await;

    let (first, first_runner) = spawn_worker("w1", WELL_BEHAVED_ENGINE, &storage);
    let (second, second_runner) = spawn_worker("w2", WELL_BEHAVED_ENGINE, &storage);

    wait_for_status(&storage, "t1", TopologyStatus::Running).await;
    wait_for_status(&storage, "t2", TopologyStatus::Running).await;

    assert_eq!(
        storage.get_topology_info("t1").await.unwrap().worker.as_deref(),
        Some("w1")
    );
    assert_eq!(
        storage.get_topology_info("t2").await.unwrap().worker.as_deref(),
        Some("w2")
    );
    assert_eq!(
        [first.coordinator().is_leader(), second.coordinator().is_leader()]
            .iter()
            .filter(|leads| **leads)
            .count(),
        1
    );

    first.request_shutdown();
    second.request_shutdown();
    wait_for_exit(first_runner).await;
    wait_for_exit(second_runner).await;
}

#[tokio::test]
async fn test_worker_over_http_store() {
    let server = TestServer::start(memory_storage()).await;
    let client = server.client();
    enabled_topologies(&client, &["t1"]).await;

    let (worker, runner) = spawn_worker("w1", WELL_BEHAVED_ENGINE, &client);

    wait_for_status(&client, "t1", TopologyStatus::Running).await;
    assert_eq!(worker.tracked().await, vec!["t1"]);

    client.shut_down_worker("w1").await.unwrap();
    wait_for_exit(runner).await;
    wait_for_status(&client, "t1", TopologyStatus::Stopped).await;

    server.stop().await;
}

#[tokio::test]
async fn test_worker_on_file_stub() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("local.json"),
        serde_json::to_string(&topology_config("local")).unwrap(),
    )
    .unwrap();

    let patterns = [FilePattern::new(FilePattern::DEFAULT).unwrap()];
    let storage: SharedStorage =
        Arc::new(FileCoordinator::open(dir.path(), &patterns).await.unwrap());

    let (worker, runner) = spawn_worker("solo", WELL_BEHAVED_ENGINE, &storage);

    tokio::time::timeout(Duration::from_secs(10), async {
        while worker.tracked().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(worker.tracked().await, vec!["local"]);

    worker.request_shutdown();
    wait_for_exit(runner).await;
    assert!(worker.tracked().await.is_empty());
}
