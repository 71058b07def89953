//! In-memory coordination store
//!
//! This is the reference implementation of [`CoordinationStorage`]: the file
//! backend delegates to it and the HTTP service wraps it, so every backend
//! shows exactly these semantics for the same call sequence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::{
    LeadershipState, LeadershipStatus, Message, MessageCommand, MessageContent, TopologyConfig,
    TopologyRecord, TopologyStatus, WorkerRecord, WorkerStatus,
};

use super::{CoordinationStorage, StorageError, StorageResult, StorageTimeouts};

// ============================================================================
// State
// ============================================================================

/// Plain state plus the transition rules; callers hold the lock
#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    workers: BTreeMap<String, WorkerRecord>,
    topologies: BTreeMap<String, TopologyRecord>,
    messages: Vec<Message>,
}

/// `true` if more than `limit` has passed between `since` and `now`
fn expired(since: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    match chrono::Duration::from_std(limit) {
        Ok(limit) => now - since > limit,
        Err(_) => false,
    }
}

impl MemoryState {
    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Alive workers that stopped pinging become dead
    pub(crate) fn disable_defunct_workers(&mut self, now: DateTime<Utc>, limit: Duration) {
        for worker in self.workers.values_mut() {
            if worker.is_alive() && expired(worker.last_ping, now, limit) {
                tracing::info!(worker = %worker.name, "Worker stopped pinging, marking dead");
                worker.status = WorkerStatus::Dead;
                worker.clear_leadership(now);
            }
        }
    }

    /// Waiting topologies that were never confirmed, or whose worker died, are reclaimed
    pub(crate) fn unassign_waiting_topologies(&mut self, now: DateTime<Utc>, limit: Duration) {
        let workers = &self.workers;
        for topology in self.topologies.values_mut() {
            let worker_dead = topology
                .worker
                .as_deref()
                .and_then(|name| workers.get(name))
                .is_some_and(|w| w.status == WorkerStatus::Dead);

            if worker_dead {
                tracing::info!(
                    uuid = %topology.uuid,
                    worker = ?topology.worker,
                    "Topology bound to dead worker, reclaiming"
                );
                if topology.status == TopologyStatus::Disabled {
                    topology.worker = None;
                    topology.last_ping = now;
                } else {
                    topology.unassign(now);
                }
            } else if topology.status == TopologyStatus::Waiting
                && expired(topology.last_ping, now, limit)
            {
                tracing::info!(uuid = %topology.uuid, "Topology start not confirmed in time, reclaiming");
                topology.unassign(now);
            }
        }
    }

    /// Expired candidacies and leaderships are cleared; at most one leader survives
    pub(crate) fn disable_defunct_leaders(&mut self, now: DateTime<Utc>, limit: Duration) {
        for worker in self.workers.values_mut() {
            if worker.lstatus != LeadershipState::None
                && (!worker.is_alive() || expired(worker.lstatus_ts, now, limit))
            {
                tracing::info!(
                    worker = %worker.name,
                    lstatus = ?worker.lstatus,
                    "Leadership state expired"
                );
                worker.clear_leadership(now);
            }
        }

        let senior = self
            .workers
            .values()
            .filter(|w| w.is_leader())
            .min_by(|a, b| a.lstatus_ts.cmp(&b.lstatus_ts).then_with(|| a.name.cmp(&b.name)))
            .map(|w| w.name.clone());

        if let Some(senior) = senior {
            for worker in self.workers.values_mut() {
                if worker.is_leader() && worker.name != senior {
                    tracing::warn!(worker = %worker.name, leader = %senior, "Demoting extra leader");
                    worker.clear_leadership(now);
                }
            }
        }
    }

    fn run_status_sweeps(&mut self, now: DateTime<Utc>, timeouts: &StorageTimeouts) {
        self.disable_defunct_workers(now, timeouts.worker_liveness);
        self.unassign_waiting_topologies(now, timeouts.waiting_topology);
    }

    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    pub(crate) fn register_worker(&mut self, name: &str, now: DateTime<Utc>) -> StorageResult<()> {
        if name.trim().is_empty() {
            return Err(StorageError::invalid_request("worker name cannot be empty"));
        }
        self.workers
            .insert(name.to_string(), WorkerRecord::new(name, now));
        Ok(())
    }

    pub(crate) fn set_worker_status(
        &mut self,
        name: &str,
        status: WorkerStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| StorageError::worker_not_found(name))?;

        worker.status = status;
        if status == WorkerStatus::Alive {
            worker.last_ping = now;
        } else {
            worker.clear_leadership(now);
        }
        Ok(())
    }

    fn worker_mut(&mut self, name: &str) -> StorageResult<&mut WorkerRecord> {
        self.workers
            .get_mut(name)
            .ok_or_else(|| StorageError::worker_not_found(name))
    }

    // ------------------------------------------------------------------
    // Leadership
    // ------------------------------------------------------------------

    pub(crate) fn leadership_status(&self) -> LeadershipStatus {
        if self.workers.values().any(WorkerRecord::is_leader) {
            LeadershipStatus::Ok
        } else if self.workers.values().any(|w| w.lstatus.is_candidate()) {
            LeadershipStatus::Pending
        } else {
            LeadershipStatus::Vacant
        }
    }

    pub(crate) fn announce_leader_candidacy(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if !self.workers.contains_key(name) {
            return Err(StorageError::worker_not_found(name));
        }
        if self.leadership_status() != LeadershipStatus::Vacant {
            return Ok(());
        }

        let worker = self.worker_mut(name)?;
        if !worker.is_alive() {
            return Ok(());
        }
        worker.lstatus = LeadershipState::Pending;
        worker.lstatus_ts = now;
        tracing::debug!(worker = %name, "Leader candidacy announced");
        Ok(())
    }

    pub(crate) fn check_leader_candidacy(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let worker = self.worker_mut(name)?;
        match worker.lstatus {
            LeadershipState::Pending | LeadershipState::Candidate => {
                worker.lstatus = LeadershipState::Leader;
                worker.lstatus_ts = now;
                tracing::info!(worker = %name, "Leader candidacy confirmed");
                Ok(true)
            }
            LeadershipState::Leader => {
                worker.lstatus_ts = now;
                Ok(true)
            }
            LeadershipState::None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub(crate) fn take_messages(&mut self, name: &str, now: DateTime<Utc>) -> Vec<Message> {
        if let Some(worker) = self.workers.get_mut(name) {
            worker.last_ping = now;
            if worker.is_leader() {
                worker.lstatus_ts = now;
            }
        }

        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.worker == name);
        self.messages = rest;
        mine
    }

    /// Drop a start message that has not been delivered yet; true if one was removed
    fn withdraw_start(&mut self, uuid: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| {
            !(m.cmd == MessageCommand::Start
                && matches!(&m.content, MessageContent::Start { uuid: u, .. } if u == uuid))
        });
        self.messages.len() != before
    }

    fn drop_messages_for_topology(&mut self, uuid: &str) {
        self.messages.retain(|m| match &m.content {
            MessageContent::Start { uuid: u, .. } | MessageContent::Topology { uuid: u } => u != uuid,
            MessageContent::Empty {} => true,
        });
    }

    pub(crate) fn shut_down_worker(&mut self, name: &str) -> StorageResult<()> {
        if !self.workers.contains_key(name) {
            return Err(StorageError::worker_not_found(name));
        }
        self.messages.push(Message::shutdown(name));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Topologies
    // ------------------------------------------------------------------

    fn topology_mut(&mut self, uuid: &str) -> StorageResult<&mut TopologyRecord> {
        self.topologies
            .get_mut(uuid)
            .ok_or_else(|| StorageError::topology_not_found(uuid))
    }

    pub(crate) fn topology(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        self.topologies
            .get(uuid)
            .cloned()
            .ok_or_else(|| StorageError::topology_not_found(uuid))
    }

    pub(crate) fn register_topology(
        &mut self,
        uuid: &str,
        config: TopologyConfig,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if uuid.trim().is_empty() {
            return Err(StorageError::invalid_request("topology uuid cannot be empty"));
        }

        match self.topologies.get_mut(uuid) {
            Some(existing) if existing.status.is_active() => Err(StorageError::TopologyActive {
                uuid: uuid.to_string(),
                status: existing.status,
            }),
            Some(existing) => {
                existing.config = config;
                existing.last_ping = now;
                Ok(())
            }
            None => {
                self.topologies
                    .insert(uuid.to_string(), TopologyRecord::new(uuid, config, now));
                Ok(())
            }
        }
    }

    pub(crate) fn enable_topology(&mut self, uuid: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let topology = self.topology_mut(uuid)?;
        if matches!(
            topology.status,
            TopologyStatus::Disabled | TopologyStatus::Stopped
        ) {
            topology.unassign(now);
            topology.error = None;
        }
        Ok(())
    }

    pub(crate) fn disable_topology(&mut self, uuid: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let (active, worker) = {
            let topology = self.topology_mut(uuid)?;
            (topology.status.is_active(), topology.worker.clone())
        };

        let needs_stop = match (&worker, active) {
            (Some(_), true) => !self.withdraw_start(uuid),
            _ => false,
        };

        if needs_stop {
            if let Some(worker) = &worker {
                self.messages.push(Message::stop_topology(worker, uuid));
            }
        }

        let topology = self.topology_mut(uuid)?;
        topology.status = TopologyStatus::Disabled;
        topology.last_ping = now;
        if !needs_stop {
            topology.worker = None;
        }
        Ok(())
    }

    pub(crate) fn stop_topology(&mut self, uuid: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let (active, worker) = {
            let topology = self.topology_mut(uuid)?;
            (topology.status.is_active(), topology.worker.clone())
        };

        if let (Some(worker), true) = (&worker, active) {
            if !self.withdraw_start(uuid) {
                self.messages.push(Message::stop_topology(worker, uuid));
                return Ok(());
            }
        }

        let topology = self.topology_mut(uuid)?;
        if topology.status != TopologyStatus::Disabled {
            topology.status = TopologyStatus::Stopped;
        }
        topology.worker = None;
        topology.last_ping = now;
        Ok(())
    }

    pub(crate) fn delete_topology(&mut self, uuid: &str) -> StorageResult<()> {
        let topology = self.topology(uuid)?;
        if topology.status.is_active() {
            return Err(StorageError::TopologyActive {
                uuid: uuid.to_string(),
                status: topology.status,
            });
        }
        self.topologies.remove(uuid);
        self.drop_messages_for_topology(uuid);
        Ok(())
    }

    pub(crate) fn clear_topology_error(
        &mut self,
        uuid: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let topology = self.topology_mut(uuid)?;
        if topology.status != TopologyStatus::Error {
            return Err(StorageError::InvalidTransition {
                uuid: uuid.to_string(),
                from: topology.status,
                to: TopologyStatus::Unassigned,
            });
        }
        topology.unassign(now);
        topology.error = None;
        Ok(())
    }

    pub(crate) fn assign_topology(
        &mut self,
        uuid: &str,
        worker: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let topology = self.topology_mut(uuid)?;
        match topology.status {
            TopologyStatus::Unassigned | TopologyStatus::Stopped | TopologyStatus::Error => {}
            status if status.is_active() => {
                return Err(StorageError::TopologyActive {
                    uuid: uuid.to_string(),
                    status,
                });
            }
            from => {
                return Err(StorageError::InvalidTransition {
                    uuid: uuid.to_string(),
                    from,
                    to: TopologyStatus::Waiting,
                });
            }
        }

        topology.status = TopologyStatus::Waiting;
        topology.worker = Some(worker.to_string());
        topology.last_ping = now;
        topology.error = None;
        let config = topology.config.clone();

        self.messages.push(Message::start(worker, uuid, config));
        tracing::debug!(uuid = %uuid, worker = %worker, "Topology assigned");
        Ok(())
    }

    pub(crate) fn set_topology_status(
        &mut self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let topology = self.topology_mut(uuid)?;
        match status {
            TopologyStatus::Running => {
                // Only a bound, active topology can be confirmed as running
                if topology.worker.is_none() || !topology.status.is_active() {
                    return Err(StorageError::InvalidTransition {
                        uuid: uuid.to_string(),
                        from: topology.status,
                        to: TopologyStatus::Running,
                    });
                }
                topology.status = TopologyStatus::Running;
                topology.error = None;
            }
            TopologyStatus::Stopped => {
                if topology.status != TopologyStatus::Disabled {
                    topology.status = TopologyStatus::Stopped;
                }
                topology.worker = None;
                topology.error = None;
            }
            TopologyStatus::Error => {
                topology.status = TopologyStatus::Error;
                topology.worker = None;
                topology.error = Some(error.unwrap_or("unknown error").to_string());
            }
            to => {
                return Err(StorageError::InvalidTransition {
                    uuid: uuid.to_string(),
                    from: topology.status,
                    to,
                });
            }
        }
        topology.last_ping = now;
        Ok(())
    }

    pub(crate) fn topologies_for_worker(&self, name: &str) -> Vec<TopologyRecord> {
        self.topologies
            .values()
            .filter(|t| t.is_bound_to(name))
            .cloned()
            .collect()
    }
}

// ============================================================================
// Memory Storage
// ============================================================================

/// Coordination store held entirely in process memory
///
/// Every method takes the state lock once and never awaits while holding it,
/// so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
    timeouts: StorageTimeouts,
}

impl MemoryStorage {
    /// Create an empty store with the default policy timeouts
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with custom sweep thresholds
    pub fn with_timeouts(timeouts: StorageTimeouts) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            timeouts,
        }
    }

    pub fn timeouts(&self) -> StorageTimeouts {
        self.timeouts
    }

    /// Worker count, without running sweeps
    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    /// Topology count, without running sweeps
    pub async fn topology_count(&self) -> usize {
        self.state.lock().await.topologies.len()
    }

    /// Number of undelivered messages
    pub async fn pending_message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }
}

#[async_trait]
impl CoordinationStorage for MemoryStorage {
    async fn register_worker(&self, name: &str) -> StorageResult<()> {
        self.state.lock().await.register_worker(name, Utc::now())
    }

    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>> {
        let mut state = self.state.lock().await;
        state.run_status_sweeps(Utc::now(), &self.timeouts);
        Ok(state.workers.values().cloned().collect())
    }

    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>> {
        let mut state = self.state.lock().await;
        state.run_status_sweeps(Utc::now(), &self.timeouts);
        Ok(state.topologies.values().cloned().collect())
    }

    async fn get_topologies_for_worker(&self, name: &str) -> StorageResult<Vec<TopologyRecord>> {
        Ok(self.state.lock().await.topologies_for_worker(name))
    }

    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus> {
        let mut state = self.state.lock().await;
        state.disable_defunct_leaders(Utc::now(), self.timeouts.leadership);
        Ok(state.leadership_status())
    }

    async fn announce_leader_candidacy(&self, name: &str) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .announce_leader_candidacy(name, Utc::now())
    }

    async fn check_leader_candidacy(&self, name: &str) -> StorageResult<bool> {
        self.state
            .lock()
            .await
            .check_leader_candidacy(name, Utc::now())
    }

    async fn assign_topology(&self, uuid: &str, worker: &str) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .assign_topology(uuid, worker, Utc::now())
    }

    async fn set_topology_status(
        &self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .set_topology_status(uuid, status, error, Utc::now())
    }

    async fn set_worker_status(&self, name: &str, status: WorkerStatus) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .set_worker_status(name, status, Utc::now())
    }

    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>> {
        Ok(self.state.lock().await.take_messages(name, Utc::now()))
    }

    async fn register_topology(&self, uuid: &str, config: TopologyConfig) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .register_topology(uuid, config, Utc::now())
    }

    async fn enable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.state.lock().await.enable_topology(uuid, Utc::now())
    }

    async fn disable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.state.lock().await.disable_topology(uuid, Utc::now())
    }

    async fn delete_topology(&self, uuid: &str) -> StorageResult<()> {
        self.state.lock().await.delete_topology(uuid)
    }

    async fn stop_topology(&self, uuid: &str) -> StorageResult<()> {
        self.state.lock().await.stop_topology(uuid, Utc::now())
    }

    async fn clear_topology_error(&self, uuid: &str) -> StorageResult<()> {
        self.state
            .lock()
            .await
            .clear_topology_error(uuid, Utc::now())
    }

    async fn shut_down_worker(&self, name: &str) -> StorageResult<()> {
        self.state.lock().await.shut_down_worker(name)
    }

    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        self.state.lock().await.topology(uuid)
    }
}

// ============================================================================
// Tests
// ============================================================================
