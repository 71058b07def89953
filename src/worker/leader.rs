//! Cluster leadership and topology placement
//!
//! Every worker runs a leader loop. On each tick it competes for leadership
//! through the store and, while it leads, places unassigned topologies on the
//! least-loaded alive workers:
//!
//! ```text
//!   tick ──► leadership status ──vacant──► announce candidacy
//!                  │                              │
//!                  └──────────► check candidacy ◄─┘
//!                                     │ leader?
//!                                     ▼
//!              worker + topology status (sweeps run here)
//!                                     │
//!                          plan_assignments ──► assign_topology
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics;
use crate::models::LeadershipStatus;
use crate::scheduler::plan_assignments;
use crate::storage::{SharedStorage, StorageResult};

/// Outcome of one leader tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderTick {
    /// Whether this worker leads after the tick
    pub is_leader: bool,

    /// Topologies handed out during the tick
    pub assigned: usize,
}

struct LeaderCore {
    name: String,
    storage: SharedStorage,
    is_leader: AtomicBool,
}

impl LeaderCore {
    async fn tick(&self) -> StorageResult<LeaderTick> {
        if self.storage.get_leadership_status().await? == LeadershipStatus::Vacant {
            self.storage.announce_leader_candidacy(&self.name).await?;
        }

        let leads = self.storage.check_leader_candidacy(&self.name).await?;
        let was_leader = self.is_leader.swap(leads, Ordering::SeqCst);

        match (was_leader, leads) {
            (false, true) => {
                tracing::info!(worker = %self.name, "Became leader");
                metrics::record_leadership_change(&self.name, "gained");
            }
            (true, false) => {
                tracing::warn!(worker = %self.name, "Lost leadership");
                metrics::record_leadership_change(&self.name, "lost");
            }
            _ => {}
        }

        if !leads {
            return Ok(LeaderTick {
                is_leader: false,
                assigned: 0,
            });
        }

        let assigned = self.place_topologies().await?;
        Ok(LeaderTick {
            is_leader: true,
            assigned,
        })
    }

    async fn place_topologies(&self) -> StorageResult<usize> {
        let workers = self.storage.get_worker_status().await?;
        let topologies = self.storage.get_topology_status().await?;

        let mut assigned = 0;
        for assignment in plan_assignments(&workers, &topologies) {
            match self
                .storage
                .assign_topology(&assignment.uuid, &assignment.worker)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        uuid = %assignment.uuid,
                        worker = %assignment.worker,
                        "Topology assigned"
                    );
                    assigned += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        uuid = %assignment.uuid,
                        worker = %assignment.worker,
                        error = %e,
                        "Failed to assign topology"
                    );
                }
            }
        }

        Ok(assigned)
    }
}

/// Leader loop of one worker
pub struct TopologyLeader {
    core: Arc<LeaderCore>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TopologyLeader {
    pub fn new(name: impl Into<String>, storage: SharedStorage, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            core: Arc::new(LeaderCore {
                name: name.into(),
                storage,
                is_leader: AtomicBool::new(false),
            }),
            interval,
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Whether the last tick left this worker leading
    pub fn is_leader(&self) -> bool {
        self.core.is_leader.load(Ordering::SeqCst)
    }

    /// Run a single tick now
    pub async fn tick(&self) -> StorageResult<LeaderTick> {
        self.core.tick().await
    }

    /// Start ticking in the background; a second call is a no-op
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }

        let core = Arc::clone(&self.core);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = core.tick().await {
                            tracing::warn!(worker = %core.name, error = %e, "Leader tick failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!(worker = %core.name, "Leader loop shutting down");
                        break;
                    }
                }
            }
        }));
    }

    /// Stop ticking and wait for an in-flight tick to finish
    ///
    /// Leadership is not resigned; the store expires it once pings stop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(worker = %self.core.name, error = %e, "Leader task failed");
            }
        }
    }
}
