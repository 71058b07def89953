//! Local supervisor of engine processes
//!
//! Consumes [`CoordinatorEvent`]s and engine exit notices, keeps one entry per
//! topology it owns and reports every transition back through the
//! coordinator:
//!
//! ```text
//!   Start ──► starting ──compile, spawn, init, run──► running ──exit──► (gone)
//!                │                                      │
//!                └── any failure ──► (gone), error      └── Stop ──► shutdown, stopped
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::compiler::{CompileError, TopologyCompiler};
use super::coordinator::{CoordinatorEvent, TopologyCoordinator};
use super::proxy::{ProxyError, ProxyExit, TopologyLocalProxy};
use super::settings::{EngineCommand, WorkerSettings};
use crate::metrics;
use crate::models::{TopologyConfig, TopologyStatus, WorkerStatus};
use crate::storage::{SharedStorage, StorageError};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Worker is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Starting,
    Running,
}

#[derive(Debug)]
struct Tracked {
    state: TrackState,
    proxy: Option<Arc<TopologyLocalProxy>>,

    /// A stop arrived while still starting
    stop_requested: bool,
}

struct Receivers {
    events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    exits: mpsc::UnboundedReceiver<ProxyExit>,
}

/// Supervises the engine processes of one worker
pub struct TopologyWorker {
    coordinator: Arc<TopologyCoordinator>,
    compiler: Arc<dyn TopologyCompiler>,
    engine: EngineCommand,
    topologies: Mutex<HashMap<String, Tracked>>,
    starts: Mutex<Vec<JoinHandle<()>>>,
    exits: mpsc::UnboundedSender<ProxyExit>,
    receivers: Mutex<Option<Receivers>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TopologyWorker {
    pub fn new(
        settings: WorkerSettings,
        storage: SharedStorage,
        compiler: Arc<dyn TopologyCompiler>,
    ) -> Arc<Self> {
        let engine = settings.engine.clone();
        let (coordinator, events) = TopologyCoordinator::new(settings, storage);
        let (exits, exits_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            coordinator: Arc::new(coordinator),
            compiler,
            engine,
            topologies: Mutex::new(HashMap::new()),
            starts: Mutex::new(Vec::new()),
            exits,
            receivers: Mutex::new(Some(Receivers {
                events,
                exits: exits_rx,
            })),
            shutdown_tx,
        })
    }

    pub fn name(&self) -> &str {
        self.coordinator.name()
    }

    pub fn coordinator(&self) -> &Arc<TopologyCoordinator> {
        &self.coordinator
    }

    /// Uuids currently supervised, sorted
    pub async fn tracked(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.topologies.lock().await.keys().cloned().collect();
        uuids.sort();
        uuids
    }

    /// Ask a running worker to shut down as if a shutdown message arrived
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Register with the store and supervise until shut down
    pub async fn run(self: &Arc<Self>) -> Result<(), WorkerError> {
        let Receivers {
            mut events,
            mut exits,
        } = self
            .receivers
            .lock()
            .await
            .take()
            .ok_or(WorkerError::AlreadyRunning)?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.coordinator.run().await?;
        tracing::info!(worker = %self.name(), "Worker started");

        loop {
            if *shutdown_rx.borrow_and_update() {
                tracing::info!(worker = %self.name(), "Shutdown requested locally");
                break;
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(CoordinatorEvent::Start { uuid, config }) => self.handle_start(uuid, config).await,
                    Some(CoordinatorEvent::Stop { uuid }) => self.handle_stop(&uuid).await,
                    Some(CoordinatorEvent::Shutdown) => {
                        tracing::info!(worker = %self.name(), "Shutdown requested by the store");
                        break;
                    }
                    None => break,
                },
                Some(exit) = exits.recv() => self.handle_exit(exit).await,
                _ = shutdown_rx.changed() => {}
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_start(self: &Arc<Self>, uuid: String, config: TopologyConfig) {
        {
            let mut topologies = self.topologies.lock().await;
            if topologies.contains_key(&uuid) {
                drop(topologies);
                tracing::warn!(uuid = %uuid, "Start for a topology already supervised here");
                self.coordinator
                    .report_topology(
                        &uuid,
                        TopologyStatus::Error,
                        Some("topology is already running on this worker"),
                    )
                    .await;
                return;
            }

            topologies.insert(
                uuid.clone(),
                Tracked {
                    state: TrackState::Starting,
                    proxy: None,
                    stop_requested: false,
                },
            );
            metrics::set_running_topologies(self.name(), topologies.len());
        }

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.start_topology(uuid, config).await });

        let mut starts = self.starts.lock().await;
        starts.retain(|h| !h.is_finished());
        starts.push(handle);
    }

    async fn start_topology(&self, uuid: String, config: TopologyConfig) {
        tracing::info!(uuid = %uuid, "Starting topology");

        let proxy = match self.launch(&uuid, &config).await {
            Ok(proxy) => proxy,
            Err(e) => {
                let Some(tracked) = self.untrack(&uuid).await else {
                    tracing::debug!(uuid = %uuid, error = %e, "Start abandoned for a settled topology");
                    return;
                };
                tracing::error!(uuid = %uuid, error = %e, "Topology failed to start");
                if let Some(proxy) = tracked.proxy {
                    proxy.kill().await;
                }
                self.coordinator
                    .report_topology(&uuid, TopologyStatus::Error, Some(&e.to_string()))
                    .await;
                return;
            }
        };

        // Reported while still starting, so no exit report can overtake it
        self.coordinator
            .report_topology(&uuid, TopologyStatus::Running, None)
            .await;

        let stop_requested = {
            let mut topologies = self.topologies.lock().await;
            topologies.get_mut(&uuid).map(|tracked| {
                tracked.state = TrackState::Running;
                tracked.stop_requested
            })
        };

        match stop_requested {
            Some(true) => self.stop_topology(&uuid).await,
            Some(false) => {
                tracing::info!(uuid = %uuid, "Topology running");
                // Exit notices are skipped while starting
                if proxy.has_exited().await && self.untrack(&uuid).await.is_some() {
                    tracing::info!(uuid = %uuid, "Engine finished during start");
                    self.coordinator
                        .report_topology(&uuid, TopologyStatus::Stopped, None)
                        .await;
                }
            }
            None => {
                if let Err(e) = proxy.shutdown().await {
                    tracing::warn!(uuid = %uuid, error = %e, "Engine shutdown failed");
                }
            }
        }
    }

    async fn launch(
        &self,
        uuid: &str,
        config: &TopologyConfig,
    ) -> Result<Arc<TopologyLocalProxy>, WorkerError> {
        let compiled = self.compiler.compile(uuid, config).await?;
        let proxy = Arc::new(TopologyLocalProxy::spawn(
            uuid,
            &self.engine,
            self.exits.clone(),
        )?);

        let still_tracked = {
            let mut topologies = self.topologies.lock().await;
            match topologies.get_mut(uuid) {
                Some(tracked) => {
                    tracked.proxy = Some(Arc::clone(&proxy));
                    true
                }
                None => false,
            }
        };
        if !still_tracked {
            proxy.kill().await;
            return Err(ProxyError::ChildExited { code: None }.into());
        }

        proxy.init(&compiled).await?;
        proxy.run().await?;
        Ok(proxy)
    }

    async fn handle_stop(&self, uuid: &str) {
        let proxy = {
            let mut topologies = self.topologies.lock().await;
            match topologies.get_mut(uuid) {
                Some(tracked) if tracked.state == TrackState::Starting => {
                    tracing::info!(uuid = %uuid, "Stop deferred until start completes");
                    tracked.stop_requested = true;
                    return;
                }
                Some(tracked) => tracked.proxy.clone(),
                None => None,
            }
        };

        match proxy {
            Some(_) => self.stop_topology(uuid).await,
            None => {
                tracing::info!(uuid = %uuid, "Stop for a topology not supervised here");
                self.coordinator
                    .report_topology(uuid, TopologyStatus::Stopped, None)
                    .await;
            }
        }
    }

    async fn stop_topology(&self, uuid: &str) {
        let Some(tracked) = self.untrack(uuid).await else {
            return;
        };

        if let Some(proxy) = tracked.proxy {
            if let Err(e) = proxy.shutdown().await {
                tracing::warn!(uuid = %uuid, error = %e, "Engine shutdown failed");
            }
        }

        tracing::info!(uuid = %uuid, "Topology stopped");
        self.coordinator
            .report_topology(uuid, TopologyStatus::Stopped, None)
            .await;
    }

    async fn handle_exit(&self, exit: ProxyExit) {
        let removed = {
            let mut topologies = self.topologies.lock().await;
            let running = matches!(
                topologies.get(&exit.uuid),
                Some(tracked) if tracked.state == TrackState::Running
            );

            // A starting entry is settled by its start task
            if running {
                let removed = topologies.remove(&exit.uuid);
                metrics::set_running_topologies(self.name(), topologies.len());
                removed
            } else {
                None
            }
        };

        if removed.is_none() {
            tracing::debug!(uuid = %exit.uuid, code = ?exit.code, "Exit of an untracked engine");
            return;
        }

        metrics::record_proxy_exit(exit.is_clean());
        if exit.is_clean() {
            tracing::info!(uuid = %exit.uuid, "Engine finished");
        } else {
            tracing::warn!(uuid = %exit.uuid, code = ?exit.code, "Engine died");
        }
        self.coordinator
            .report_topology(&exit.uuid, TopologyStatus::Stopped, None)
            .await;
    }

    async fn untrack(&self, uuid: &str) -> Option<Tracked> {
        let mut topologies = self.topologies.lock().await;
        let removed = topologies.remove(uuid);
        metrics::set_running_topologies(self.name(), topologies.len());
        removed
    }

    /// Let in-flight starts settle, stop every engine, report the worker dead
    /// and stop the coordinator
    pub async fn shutdown(&self) {
        let starts: Vec<JoinHandle<()>> = self.starts.lock().await.drain(..).collect();
        if !starts.is_empty() {
            tracing::info!(worker = %self.name(), pending = starts.len(), "Waiting for topology starts");
        }
        for result in futures::future::join_all(starts).await {
            if let Err(e) = result {
                tracing::warn!(worker = %self.name(), error = %e, "Topology start task failed");
            }
        }

        let tracked: Vec<(String, Tracked)> = {
            let mut topologies = self.topologies.lock().await;
            let drained = topologies.drain().collect();
            metrics::set_running_topologies(self.name(), 0);
            drained
        };

        tracing::info!(worker = %self.name(), topologies = tracked.len(), "Shutting down worker");

        let stops = tracked.into_iter().map(|(uuid, tracked)| async move {
            if let Some(proxy) = tracked.proxy {
                if let Err(e) = proxy.shutdown().await {
                    tracing::warn!(uuid = %uuid, error = %e, "Engine shutdown failed");
                }
            }
            self.coordinator
                .report_topology(&uuid, TopologyStatus::Stopped, None)
                .await;
        });
        futures::future::join_all(stops).await;

        self.coordinator.report_worker(WorkerStatus::Dead).await;
        self.coordinator.shutdown().await;
        tracing::info!(worker = %self.name(), "Worker stopped");
    }
}
