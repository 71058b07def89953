//! Common test utilities

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use topovisor::models::{TopologyConfig, TopologyStatus};
use topovisor::storage::{MemoryStorage, SharedStorage};

/// Create a topology definition with a `general.name`
pub fn topology_config(name: &str) -> TopologyConfig {
    TopologyConfig::new(json!({
        "general": { "name": name },
        "spouts": [{ "name": "source", "type": "timer" }],
        "bolts": [{ "name": "sink", "type": "console", "inputs": ["source"] }]
    }))
}

/// Fresh in-memory store behind the shared handle
#[allow(dead_code)]
pub fn memory_storage() -> SharedStorage {
    Arc::new(MemoryStorage::new())
}

/// Register and enable `uuids` so the leader may place them
#[allow(dead_code)]
pub async fn enabled_topologies(storage: &SharedStorage, uuids: &[&str]) {
    for uuid in uuids {
        storage
            .register_topology(uuid, topology_config(uuid))
            .await
            .unwrap();
        storage.enable_topology(uuid).await.unwrap();
    }
}

/// Poll until the topology reaches `status` or fail after a few seconds
#[allow(dead_code)]
pub async fn wait_for_status(storage: &SharedStorage, uuid: &str, status: TopologyStatus) {
    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(record) = storage.get_topology_info(uuid).await {
                if record.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    assert!(reached.is_ok(), "topology {uuid} never reached {status}");
}
