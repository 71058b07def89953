//! Core data structures shared by every coordination backend
//!
//! These are the records the coordination store keeps (workers, topologies,
//! queued messages) and the small enums describing their states. All of them
//! serialize to the same JSON shape on the HTTP wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Worker
// ============================================================================

/// Liveness status of a registered worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Worker is registered and pinging
    Alive,

    /// Worker stopped pinging (or reported itself dead on shutdown)
    Dead,

    /// Worker was unloaded by an operator
    Unloaded,

    /// Worker is registered but not taking work
    Inactive,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dead => "dead",
            Self::Unloaded => "unloaded",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alive" => Ok(Self::Alive),
            "dead" => Ok(Self::Dead),
            "unloaded" => Ok(Self::Unloaded),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown worker status: {other}")),
        }
    }
}

/// Leadership state of a single worker (`lstatus`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadershipState {
    /// Not involved in leadership
    #[default]
    #[serde(rename = "")]
    None,

    /// Announced candidacy, waiting for confirmation
    Pending,

    /// Candidacy written as `candidate`; handled exactly like `Pending`
    Candidate,

    /// Confirmed leader
    Leader,
}

impl LeadershipState {
    /// A worker in this state blocks new candidacies
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Pending | Self::Candidate)
    }
}

/// A worker as seen by the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Unique worker name
    pub name: String,

    /// Current liveness status
    pub status: WorkerStatus,

    /// Last successful contact
    pub last_ping: DateTime<Utc>,

    /// Leadership state
    pub lstatus: LeadershipState,

    /// Last leadership-state change (or leader refresh)
    pub lstatus_ts: DateTime<Utc>,
}

impl WorkerRecord {
    /// Fresh record for a newly registered worker
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: WorkerStatus::Alive,
            last_ping: now,
            lstatus: LeadershipState::None,
            lstatus_ts: now,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == WorkerStatus::Alive
    }

    pub fn is_leader(&self) -> bool {
        self.lstatus == LeadershipState::Leader
    }

    /// Drop any leadership involvement
    pub fn clear_leadership(&mut self, now: DateTime<Utc>) {
        self.lstatus = LeadershipState::None;
        self.lstatus_ts = now;
    }
}

// ============================================================================
// Topology
// ============================================================================

/// Run status of a registered topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyStatus {
    /// Enabled and waiting for the leader to place it
    Unassigned,

    /// Assigned; the start message is queued or in flight
    Waiting,

    /// Running on its worker
    Running,

    /// Failed to start (see `error`)
    Error,

    /// Stopped by its worker
    Stopped,

    /// Registered but not eligible for assignment
    Disabled,
}

impl TopologyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Error => "error",
            Self::Stopped => "stopped",
            Self::Disabled => "disabled",
        }
    }

    /// States that always carry a bound worker
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

impl fmt::Display for TopologyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "waiting" => Ok(Self::Waiting),
            "running" => Ok(Self::Running),
            "error" => Ok(Self::Error),
            "stopped" => Ok(Self::Stopped),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown topology status: {other}")),
        }
    }
}

/// Opaque topology definition
///
/// The orchestrator only ever looks at `general.name`; everything else is
/// handed to the dataflow engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyConfig(pub Value);

impl TopologyConfig {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// `general.name`, if present and a string
    pub fn general_name(&self) -> Option<&str> {
        self.0
            .get("general")
            .and_then(|g| g.get("name"))
            .and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for TopologyConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A topology as seen by the coordination store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyRecord {
    /// Unique topology id
    pub uuid: String,

    /// Opaque definition
    pub config: TopologyConfig,

    /// Current run status
    pub status: TopologyStatus,

    /// Worker the topology is bound to
    pub worker: Option<String>,

    /// Last status update
    pub last_ping: DateTime<Utc>,

    /// Last error message
    pub error: Option<String>,
}

impl TopologyRecord {
    /// Newly registered topologies start out disabled
    pub fn new(uuid: impl Into<String>, config: TopologyConfig, now: DateTime<Utc>) -> Self {
        Self {
            uuid: uuid.into(),
            config,
            status: TopologyStatus::Disabled,
            worker: None,
            last_ping: now,
            error: None,
        }
    }

    /// Return to the pool of topologies the leader may place
    pub fn unassign(&mut self, now: DateTime<Utc>) {
        self.status = TopologyStatus::Unassigned;
        self.worker = None;
        self.last_ping = now;
    }

    pub fn is_bound_to(&self, worker: &str) -> bool {
        self.worker.as_deref() == Some(worker)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Command carried by a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCommand {
    /// Start a topology
    Start,

    /// Stop a single topology
    StopTopology,

    /// Shut the whole worker down
    Shutdown,
}

/// Payload of a queued message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// `start`: the topology and its definition
    Start { uuid: String, config: TopologyConfig },

    /// `stop_topology`: which topology to stop
    Topology { uuid: String },

    /// `shutdown`: no payload
    Empty {},
}

/// A command queued for one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Target worker name
    pub worker: String,

    /// Command
    pub cmd: MessageCommand,

    /// Command payload
    pub content: MessageContent,

    /// When the message was queued
    pub created: DateTime<Utc>,
}

impl Message {
    pub fn start(worker: impl Into<String>, uuid: impl Into<String>, config: TopologyConfig) -> Self {
        Self {
            worker: worker.into(),
            cmd: MessageCommand::Start,
            content: MessageContent::Start {
                uuid: uuid.into(),
                config,
            },
            created: Utc::now(),
        }
    }

    pub fn stop_topology(worker: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            cmd: MessageCommand::StopTopology,
            content: MessageContent::Topology { uuid: uuid.into() },
            created: Utc::now(),
        }
    }

    pub fn shutdown(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            cmd: MessageCommand::Shutdown,
            content: MessageContent::Empty {},
            created: Utc::now(),
        }
    }
}

// ============================================================================
// Leadership
// ============================================================================

/// Cluster-wide leadership status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadershipStatus {
    /// A leader exists
    Ok,

    /// A candidate is waiting for confirmation
    Pending,

    /// Nobody leads
    Vacant,
}

impl fmt::Display for LeadershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Pending => f.write_str("pending"),
            Self::Vacant => f.write_str("vacant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_status_roundtrip_str() {
        for status in [
            WorkerStatus::Alive,
            WorkerStatus::Dead,
            WorkerStatus::Unloaded,
            WorkerStatus::Inactive,
        ] {
            assert_eq!(status.as_str().parse::<WorkerStatus>().unwrap(), status);
        }
        assert!("zombie".parse::<WorkerStatus>().is_err());
    }

    #[test]
    fn test_leadership_state_serializes_empty_string() {
        let json = serde_json::to_string(&LeadershipState::None).unwrap();
        assert_eq!(json, "\"\"");
        let parsed: LeadershipState = serde_json::from_str("\"leader\"").unwrap();
        assert_eq!(parsed, LeadershipState::Leader);
    }

    #[test]
    fn test_topology_config_general_name() {
        let config = TopologyConfig::new(json!({"general": {"name": "t1"}, "spouts": []}));
        assert_eq!(config.general_name(), Some("t1"));

        let nameless = TopologyConfig::new(json!({"bolts": []}));
        assert_eq!(nameless.general_name(), None);
    }

    #[test]
    fn test_new_topology_is_disabled_and_unbound() {
        let record = TopologyRecord::new("t1", TopologyConfig::new(json!({})), Utc::now());
        assert_eq!(record.status, TopologyStatus::Disabled);
        assert!(record.worker.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = Message::start("w1", "t1", TopologyConfig::new(json!({"general": {"name": "t1"}})));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["cmd"], "start");
        assert_eq!(value["content"]["uuid"], "t1");
        assert_eq!(value["content"]["config"]["general"]["name"], "t1");

        let stop = serde_json::to_value(Message::stop_topology("w1", "t1")).unwrap();
        assert_eq!(stop["cmd"], "stop_topology");

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_shutdown_message_content_is_empty_object() {
        let value = serde_json::to_value(Message::shutdown("w1")).unwrap();
        assert_eq!(value["content"], json!({}));
        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.cmd, MessageCommand::Shutdown);
    }
}
