//! Placement of unassigned topologies onto alive workers

use std::collections::BTreeMap;

use crate::models::{TopologyRecord, TopologyStatus, WorkerRecord};

use super::balancer::LoadBalancer;

/// One planned `assign_topology` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub uuid: String,
    pub worker: String,
}

/// Plan where every `unassigned` topology should go
///
/// Each alive worker starts weighted by the topologies it is already running
/// or waiting on. Topologies are placed in uuid order. Returns nothing when no
/// worker is alive.
pub fn plan_assignments(workers: &[WorkerRecord], topologies: &[TopologyRecord]) -> Vec<Assignment> {
    let mut loads: BTreeMap<&str, usize> = workers
        .iter()
        .filter(|w| w.is_alive())
        .map(|w| (w.name.as_str(), 0))
        .collect();

    for topology in topologies.iter().filter(|t| t.status.is_active()) {
        if let Some(count) = topology.worker.as_deref().and_then(|w| loads.get_mut(w)) {
            *count += 1;
        }
    }

    let mut pending: Vec<&TopologyRecord> = topologies
        .iter()
        .filter(|t| t.status == TopologyStatus::Unassigned)
        .collect();
    if pending.is_empty() {
        return Vec::new();
    }
    pending.sort_by(|a, b| a.uuid.cmp(&b.uuid));

    let Ok(mut balancer) = LoadBalancer::new(loads) else {
        tracing::warn!(pending = pending.len(), "No alive workers to place topologies on");
        return Vec::new();
    };

    pending
        .into_iter()
        .map(|t| Assignment {
            uuid: t.uuid.clone(),
            worker: balancer.next(),
        })
        .collect()
}
