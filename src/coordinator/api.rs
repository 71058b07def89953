//! HTTP endpoints of the coordination service
//!
//! One POST endpoint per storage operation. Request bodies carry the
//! operation's named arguments, response bodies are exactly what the storage
//! method returns; there is no envelope. Failures come back as
//! `{"error": "<message>", "kind": "<variant>", ...}` so the client can rebuild
//! the original [`StorageError`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{TopologyConfig, TopologyStatus, WorkerStatus};
use crate::storage::StorageError;

use super::server::AppState;

// ============================================================================
// Endpoint paths
// ============================================================================

pub mod paths {
    pub const WORKER_STATUSES: &str = "/worker-statuses";
    pub const TOPOLOGY_STATUSES: &str = "/topology-statuses";
    pub const LEADERSHIP_STATUS: &str = "/leadership-status";
    pub const WORKER_TOPOLOGIES: &str = "/worker-topologies";
    pub const GET_MESSAGES: &str = "/get-messages";
    pub const ASSIGN_TOPOLOGY: &str = "/assign-topology";
    pub const CHECK_LEADER_CANDIDACY: &str = "/check-leader-candidacy";
    pub const ANNOUNCE_LEADER_CANDIDACY: &str = "/announce-leader-candidacy";
    pub const REGISTER_WORKER: &str = "/register-worker";
    pub const SET_TOPOLOGY_STATUS: &str = "/set-topology-status";
    pub const SET_WORKER_STATUS: &str = "/set-worker-status";

    pub const REGISTER_TOPOLOGY: &str = "/register-topology";
    pub const ENABLE_TOPOLOGY: &str = "/enable-topology";
    pub const DISABLE_TOPOLOGY: &str = "/disable-topology";
    pub const DELETE_TOPOLOGY: &str = "/delete-topology";
    pub const STOP_TOPOLOGY: &str = "/stop-topology";
    pub const CLEAR_TOPOLOGY_ERROR: &str = "/clear-topology-error";
    pub const SHUT_DOWN_WORKER: &str = "/shut-down-worker";
    pub const TOPOLOGY_INFO: &str = "/topology-info";
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body naming one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub worker: String,
}

/// Body naming one topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyRequest {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub uuid: String,
    pub worker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyStatusRequest {
    pub uuid: String,
    pub status: TopologyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusRequest {
    pub worker: String,
    pub status: WorkerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTopologyRequest {
    pub uuid: String,
    pub config: TopologyConfig,
}

/// Body of a successful operation with no result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Error body; `detail` is flattened so `kind` sits at the top level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(flatten)]
    pub detail: StorageError,
}

/// A storage failure turned into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub StorageError);

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self(err)
    }
}

/// Status code for each storage failure
pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::WorkerNotFound { .. } | StorageError::TopologyNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        StorageError::TopologyActive { .. } | StorageError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        StorageError::InvalidRequest { .. } | StorageError::Parse { .. } => StatusCode::BAD_REQUEST,
        StorageError::Transport { .. } => StatusCode::BAD_GATEWAY,
        StorageError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Coordination request failed");
        } else {
            tracing::debug!(error = %self.0, "Coordination request rejected");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            detail: self.0,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// API Routes
// ============================================================================

/// Create the coordination API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Contract operations
        .route(paths::WORKER_STATUSES, post(worker_statuses))
        .route(paths::TOPOLOGY_STATUSES, post(topology_statuses))
        .route(paths::LEADERSHIP_STATUS, post(leadership_status))
        .route(paths::WORKER_TOPOLOGIES, post(worker_topologies))
        .route(paths::GET_MESSAGES, post(get_messages))
        .route(paths::ASSIGN_TOPOLOGY, post(assign_topology))
        .route(paths::CHECK_LEADER_CANDIDACY, post(check_leader_candidacy))
        .route(paths::ANNOUNCE_LEADER_CANDIDACY, post(announce_leader_candidacy))
        .route(paths::REGISTER_WORKER, post(register_worker))
        .route(paths::SET_TOPOLOGY_STATUS, post(set_topology_status))
        .route(paths::SET_WORKER_STATUS, post(set_worker_status))
        // Administration
        .route(paths::REGISTER_TOPOLOGY, post(register_topology))
        .route(paths::ENABLE_TOPOLOGY, post(enable_topology))
        .route(paths::DISABLE_TOPOLOGY, post(disable_topology))
        .route(paths::DELETE_TOPOLOGY, post(delete_topology))
        .route(paths::STOP_TOPOLOGY, post(stop_topology))
        .route(paths::CLEAR_TOPOLOGY_ERROR, post(clear_topology_error))
        .route(paths::SHUT_DOWN_WORKER, post(shut_down_worker))
        .route(paths::TOPOLOGY_INFO, post(topology_info))
        .with_state(state)
}

// ============================================================================
// Status Handlers
// ============================================================================

async fn worker_statuses(State(state): State<AppState>) -> ApiResult<Vec<crate::models::WorkerRecord>> {
    let workers = state.storage.get_worker_status().await?;
    crate::metrics::update_worker_gauge(workers.iter().filter(|w| w.is_alive()).count());
    Ok(Json(workers))
}

async fn topology_statuses(
    State(state): State<AppState>,
) -> ApiResult<Vec<crate::models::TopologyRecord>> {
    let topologies = state.storage.get_topology_status().await?;

    let statuses = [
        TopologyStatus::Unassigned,
        TopologyStatus::Waiting,
        TopologyStatus::Running,
        TopologyStatus::Error,
        TopologyStatus::Stopped,
        TopologyStatus::Disabled,
    ];
    let counts: Vec<_> = statuses
        .iter()
        .map(|s| (s.as_str(), topologies.iter().filter(|t| t.status == *s).count()))
        .collect();
    crate::metrics::update_topology_gauge(&counts);

    Ok(Json(topologies))
}

async fn leadership_status(
    State(state): State<AppState>,
) -> ApiResult<crate::models::LeadershipStatus> {
    Ok(Json(state.storage.get_leadership_status().await?))
}

async fn worker_topologies(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<Vec<crate::models::TopologyRecord>> {
    Ok(Json(state.storage.get_topologies_for_worker(&req.worker).await?))
}

async fn get_messages(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<Vec<crate::models::Message>> {
    Ok(Json(state.storage.get_messages(&req.worker).await?))
}

// ============================================================================
// Leadership Handlers
// ============================================================================

async fn check_leader_candidacy(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<bool> {
    Ok(Json(state.storage.check_leader_candidacy(&req.worker).await?))
}

async fn announce_leader_candidacy(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<Ack> {
    state.storage.announce_leader_candidacy(&req.worker).await?;
    Ok(Json(Ack {}))
}

// ============================================================================
// Mutation Handlers
// ============================================================================

async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<Ack> {
    state.storage.register_worker(&req.worker).await?;
    tracing::info!(worker = %req.worker, "Worker registered");
    Ok(Json(Ack {}))
}

async fn assign_topology(
    State(state): State<AppState>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Ack> {
    state.storage.assign_topology(&req.uuid, &req.worker).await?;
    Ok(Json(Ack {}))
}

async fn set_topology_status(
    State(state): State<AppState>,
    Json(req): Json<TopologyStatusRequest>,
) -> ApiResult<Ack> {
    state
        .storage
        .set_topology_status(&req.uuid, req.status, req.error.as_deref())
        .await?;
    Ok(Json(Ack {}))
}

async fn set_worker_status(
    State(state): State<AppState>,
    Json(req): Json<WorkerStatusRequest>,
) -> ApiResult<Ack> {
    state.storage.set_worker_status(&req.worker, req.status).await?;
    Ok(Json(Ack {}))
}

// ============================================================================
// Administration Handlers
// ============================================================================

async fn register_topology(
    State(state): State<AppState>,
    Json(req): Json<RegisterTopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.register_topology(&req.uuid, req.config).await?;
    tracing::info!(uuid = %req.uuid, "Topology registered");
    Ok(Json(Ack {}))
}

async fn enable_topology(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.enable_topology(&req.uuid).await?;
    Ok(Json(Ack {}))
}

async fn disable_topology(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.disable_topology(&req.uuid).await?;
    Ok(Json(Ack {}))
}

async fn delete_topology(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.delete_topology(&req.uuid).await?;
    Ok(Json(Ack {}))
}

async fn stop_topology(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.stop_topology(&req.uuid).await?;
    Ok(Json(Ack {}))
}

async fn clear_topology_error(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<Ack> {
    state.storage.clear_topology_error(&req.uuid).await?;
    Ok(Json(Ack {}))
}

async fn shut_down_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRequest>,
) -> ApiResult<Ack> {
    state.storage.shut_down_worker(&req.worker).await?;
    tracing::info!(worker = %req.worker, "Worker shutdown requested");
    Ok(Json(Ack {}))
}

async fn topology_info(
    State(state): State<AppState>,
    Json(req): Json<TopologyRequest>,
) -> ApiResult<crate::models::TopologyRecord> {
    Ok(Json(state.storage.get_topology_info(&req.uuid).await?))
}

// ============================================================================
// Tests
// ============================================================================
