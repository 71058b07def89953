//! Per-worker link to the coordination store
//!
//! The coordinator registers the worker, starts its leader loop and polls the
//! store for queued messages. Each message becomes a [`CoordinatorEvent`] on
//! an unbounded channel. Status reports flow back the other way and are
//! best-effort: a failed report is logged and the caller carries on.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::leader::TopologyLeader;
use super::settings::WorkerSettings;
use crate::metrics;
use crate::models::{Message, MessageCommand, MessageContent, TopologyConfig, TopologyStatus, WorkerStatus};
use crate::storage::{SharedStorage, StorageResult};

/// A command for the local supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    Start { uuid: String, config: TopologyConfig },
    Stop { uuid: String },
    Shutdown,
}

impl CoordinatorEvent {
    fn from_message(message: Message) -> Option<Self> {
        match (message.cmd, message.content) {
            (MessageCommand::Start, MessageContent::Start { uuid, config }) => {
                Some(Self::Start { uuid, config })
            }
            (MessageCommand::StopTopology, MessageContent::Topology { uuid })
            | (MessageCommand::StopTopology, MessageContent::Start { uuid, .. }) => {
                Some(Self::Stop { uuid })
            }
            (MessageCommand::Shutdown, _) => Some(Self::Shutdown),
            (cmd, content) => {
                tracing::warn!(cmd = ?cmd, content = ?content, "Dropping message with mismatched payload");
                None
            }
        }
    }
}

/// Store link of one worker
pub struct TopologyCoordinator {
    settings: WorkerSettings,
    storage: SharedStorage,
    leader: TopologyLeader,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TopologyCoordinator {
    /// Build a coordinator and the receiving end of its event channel
    pub fn new(
        settings: WorkerSettings,
        storage: SharedStorage,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let leader = TopologyLeader::new(
            settings.name.clone(),
            Arc::clone(&storage),
            settings.leader_interval,
        );

        let coordinator = Self {
            settings,
            storage,
            leader,
            events,
            shutdown_tx,
            handle: Mutex::new(None),
        };
        (coordinator, events_rx)
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }

    /// Register the worker, then start the leader and the polling loop
    ///
    /// Registration failure is returned and nothing is started.
    pub async fn run(&self) -> StorageResult<()> {
        self.storage.register_worker(self.name()).await?;
        tracing::info!(worker = %self.name(), "Worker registered");

        self.leader.start().await;

        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let name = self.settings.name.clone();
        let storage = Arc::clone(&self.storage);
        let events = self.events.clone();
        let interval = self.settings.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                if let Err(e) = poll_messages(&name, &storage, &events).await {
                    tracing::warn!(worker = %name, error = %e, "Message poll failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(worker = %name, "Message loop stopped");
        }));

        Ok(())
    }

    /// Poll once outside the loop; returns the number of events emitted
    pub async fn poll_once(&self) -> StorageResult<usize> {
        poll_messages(self.name(), &self.storage, &self.events).await
    }

    /// Stop the leader, then the polling loop, waiting for both
    pub async fn shutdown(&self) {
        self.leader.shutdown().await;

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(worker = %self.name(), error = %e, "Message loop task failed");
            }
        }
        tracing::info!(worker = %self.name(), "Coordinator stopped");
    }

    /// Report a topology status; failures are logged, never returned
    pub async fn report_topology(&self, uuid: &str, status: TopologyStatus, error: Option<&str>) {
        match self.storage.set_topology_status(uuid, status, error).await {
            Ok(()) => {
                tracing::debug!(uuid = %uuid, status = %status, "Topology status reported");
                metrics::record_topology_report(status.as_str());
            }
            Err(e) => {
                tracing::warn!(uuid = %uuid, status = %status, error = %e, "Failed to report topology status");
                metrics::record_report_failure("topology");
            }
        }
    }

    /// Report this worker's status; failures are logged, never returned
    pub async fn report_worker(&self, status: WorkerStatus) {
        if let Err(e) = self.storage.set_worker_status(self.name(), status).await {
            tracing::warn!(worker = %self.name(), status = %status, error = %e, "Failed to report worker status");
            metrics::record_report_failure("worker");
        }
    }
}

async fn poll_messages(
    name: &str,
    storage: &SharedStorage,
    events: &mpsc::UnboundedSender<CoordinatorEvent>,
) -> StorageResult<usize> {
    let messages = storage.get_messages(name).await?;

    let mut emitted = 0;
    for message in messages {
        metrics::record_message_delivered(name, command_label(message.cmd));
        let Some(event) = CoordinatorEvent::from_message(message) else {
            continue;
        };

        tracing::debug!(worker = %name, event = ?event, "Message received");
        if events.send(event).is_err() {
            tracing::warn!(worker = %name, "Event receiver gone, dropping message");
            continue;
        }
        emitted += 1;
    }

    Ok(emitted)
}

fn command_label(cmd: MessageCommand) -> &'static str {
    match cmd {
        MessageCommand::Start => "start",
        MessageCommand::StopTopology => "stop_topology",
        MessageCommand::Shutdown => "shutdown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::time::Duration;

    fn settings(name: &str) -> WorkerSettings {
        WorkerSettings::builder()
            .name(name)
            .poll_interval(Duration::from_millis(10))
            .leader_interval(Duration::from_millis(10))
            .engine("engine", Vec::<String>::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_message_mapping() {
        let config = TopologyConfig::new(json!({"a": 1}));
        assert_eq!(
            CoordinatorEvent::from_message(Message::start("w1", "t1", config.clone())),
            Some(CoordinatorEvent::Start {
                uuid: "t1".into(),
                config
            })
        );
        assert_eq!(
            CoordinatorEvent::from_message(Message::stop_topology("w1", "t1")),
            Some(CoordinatorEvent::Stop { uuid: "t1".into() })
        );
        assert_eq!(
            CoordinatorEvent::from_message(Message::shutdown("w1")),
            Some(CoordinatorEvent::Shutdown)
        );

        let mut broken = Message::shutdown("w1");
        broken.cmd = MessageCommand::Start;
        assert_eq!(CoordinatorEvent::from_message(broken), None);
    }

    #[tokio::test]
    async fn test_poll_once_emits_events() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let (coordinator, mut events) = TopologyCoordinator::new(settings("w1"), Arc::clone(&storage));
        storage.register_worker("w1").await.unwrap();

        storage
            .register_topology("t1", TopologyConfig::new(json!({})))
            .await
            .unwrap();
        storage.enable_topology("t1").await.unwrap();
        storage.assign_topology("t1", "w1").await.unwrap();
        storage.shut_down_worker("w1").await.unwrap();

        assert_eq!(coordinator.poll_once().await.unwrap(), 2);
        assert!(matches!(
            events.recv().await,
            Some(CoordinatorEvent::Start { ref uuid, .. }) if uuid == "t1"
        ));
        assert_eq!(events.recv().await, Some(CoordinatorEvent::Shutdown));

        // Drained
        assert_eq!(coordinator.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_registers_and_polls() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let (coordinator, mut events) = TopologyCoordinator::new(settings("w1"), Arc::clone(&storage));

        coordinator.run().await.unwrap();
        let workers = storage.get_worker_status().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert!(workers[0].is_alive());

        storage.shut_down_worker("w1").await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(CoordinatorEvent::Shutdown));

        coordinator.shutdown().await;
        assert!(coordinator.handle.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_reports_are_best_effort() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let (coordinator, _events) = TopologyCoordinator::new(settings("w1"), Arc::clone(&storage));

        // Unknown topology and worker: logged, not raised
        coordinator
            .report_topology("missing", TopologyStatus::Running, None)
            .await;
        coordinator.report_worker(WorkerStatus::Dead).await;
    }
}
