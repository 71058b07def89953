//! Test fixtures for integration tests
//!
//! Scripted engines and a throwaway coordination server

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use topovisor::coordinator::{ClientConfig, CoordinationServer, HttpCoordinator, ServerConfig};
use topovisor::models::{
    LeadershipStatus, Message, TopologyConfig, TopologyRecord, TopologyStatus, WorkerRecord,
    WorkerStatus,
};
use topovisor::storage::{CoordinationStorage, SharedStorage, StorageResult};
use topovisor::worker::{PassthroughCompiler, TopologyWorker, WorkerSettings};

/// Engine that acknowledges every request and exits after `shutdown`
pub const WELL_BEHAVED_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"cmd":"init"'*) echo '{"cmd":"response_init","data":{"err":null}}' ;;
    *'"cmd":"run"'*) echo '{"cmd":"response_run","data":{"err":null}}' ;;
    *'"cmd":"pause"'*) echo '{"cmd":"response_pause","data":{}}' ;;
    *'"cmd":"shutdown"'*) echo '{"cmd":"response_shutdown","data":{}}'; exit 0 ;;
  esac
done
"#;

/// Engine that rejects its definition
pub const REJECTING_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"cmd":"init"'*) echo '{"cmd":"response_init","data":{"err":"bad topology"}}' ;;
  esac
done
"#;

/// Engine that starts fine and dies shortly after
pub const CRASHING_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"cmd":"init"'*) echo '{"cmd":"response_init","data":{}}' ;;
    *'"cmd":"run"'*) echo '{"cmd":"response_run","data":{}}'; sleep 0.3; exit 3 ;;
  esac
done
"#;

/// Engine that finishes on its own right after it starts running
pub const SHORT_LIVED_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"cmd":"init"'*) echo '{"cmd":"response_init","data":{}}' ;;
    *'"cmd":"run"'*) echo '{"cmd":"response_run","data":{}}'; exit 0 ;;
  esac
done
"#;

/// Engine that takes a while to accept its definition
pub const SLOW_INIT_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"cmd":"init"'*) sleep 0.5; echo '{"cmd":"response_init","data":{}}' ;;
    *'"cmd":"run"'*) echo '{"cmd":"response_run","data":{}}' ;;
    *'"cmd":"shutdown"'*) echo '{"cmd":"response_shutdown","data":{}}'; exit 0 ;;
  esac
done
"#;

/// Worker settings with short intervals running `script` under `sh -c`
pub fn scripted_settings(name: &str, script: &str) -> WorkerSettings {
    WorkerSettings::builder()
        .name(name)
        .poll_interval(Duration::from_millis(20))
        .leader_interval(Duration::from_millis(20))
        .engine("sh", ["-c", script])
        .build()
        .unwrap()
}

/// Start a worker in the background
pub fn spawn_worker(
    name: &str,
    script: &str,
    storage: &SharedStorage,
) -> (Arc<TopologyWorker>, JoinHandle<Result<(), topovisor::worker::WorkerError>>) {
    let worker = TopologyWorker::new(
        scripted_settings(name, script),
        Arc::clone(storage),
        Arc::new(PassthroughCompiler),
    );
    let runner = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };
    (worker, runner)
}

/// A coordination server on an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(storage: SharedStorage) -> Self {
        let server = CoordinationServer::new(ServerConfig::default(), storage).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A contract client pointed at this server
    pub fn client(&self) -> SharedStorage {
        let config = ClientConfig::new(self.base_url()).with_timeout(Duration::from_secs(5));
        Arc::new(HttpCoordinator::new(config).unwrap())
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.await.unwrap();
    }
}

/// Store whose `running` reports arrive late
pub struct SlowRunningReports {
    inner: SharedStorage,
    delay: Duration,
}

impl SlowRunningReports {
    pub fn wrap(inner: SharedStorage, delay: Duration) -> SharedStorage {
        Arc::new(Self { inner, delay })
    }
}

#[async_trait]
impl CoordinationStorage for SlowRunningReports {
    async fn register_worker(&self, name: &str) -> StorageResult<()> {
        self.inner.register_worker(name).await
    }

    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>> {
        self.inner.get_worker_status().await
    }

    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>> {
        self.inner.get_topology_status().await
    }

    async fn get_topologies_for_worker(&self, name: &str) -> StorageResult<Vec<TopologyRecord>> {
        self.inner.get_topologies_for_worker(name).await
    }

    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus> {
        self.inner.get_leadership_status().await
    }

    async fn announce_leader_candidacy(&self, name: &str) -> StorageResult<()> {
        self.inner.announce_leader_candidacy(name).await
    }

    async fn check_leader_candidacy(&self, name: &str) -> StorageResult<bool> {
        self.inner.check_leader_candidacy(name).await
    }

    async fn assign_topology(&self, uuid: &str, worker: &str) -> StorageResult<()> {
        self.inner.assign_topology(uuid, worker).await
    }

    async fn set_topology_status(
        &self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        if status == TopologyStatus::Running {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set_topology_status(uuid, status, error).await
    }

    async fn set_worker_status(&self, name: &str, status: WorkerStatus) -> StorageResult<()> {
        self.inner.set_worker_status(name, status).await
    }

    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>> {
        self.inner.get_messages(name).await
    }

    async fn register_topology(&self, uuid: &str, config: TopologyConfig) -> StorageResult<()> {
        self.inner.register_topology(uuid, config).await
    }

    async fn enable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.enable_topology(uuid).await
    }

    async fn disable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.disable_topology(uuid).await
    }

    async fn delete_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.delete_topology(uuid).await
    }

    async fn stop_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.stop_topology(uuid).await
    }

    async fn clear_topology_error(&self, uuid: &str) -> StorageResult<()> {
        self.inner.clear_topology_error(uuid).await
    }

    async fn shut_down_worker(&self, name: &str) -> StorageResult<()> {
        self.inner.shut_down_worker(name).await
    }

    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        self.inner.get_topology_info(uuid).await
    }
}
