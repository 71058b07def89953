//! Health probes for the coordination service
//!
//! ```yaml
//! livenessProbe:
//!   httpGet:
//!     path: /health/live
//!     port: 8080
//!
//! readinessProbe:
//!   httpGet:
//!     path: /health/ready
//!     port: 8080
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::server::AppState;

// ============================================================================
// Health Status Types
// ============================================================================

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: Vec<ComponentHealth>,
}

/// Full health report served at `/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: String,
    pub checks: Vec<ComponentHealth>,
}

// ============================================================================
// Health Checker
// ============================================================================

/// Readiness flag shared between the server and its probes
#[derive(Clone)]
pub struct HealthChecker {
    ready: Arc<AtomicBool>,
    start_time: Instant,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("Health check: service marked as ready");
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
        tracing::warn!("Health check: service marked as not ready");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// ============================================================================
// Health Check Router
// ============================================================================

pub fn create_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Probe the store with a read that has no side effects on records
async fn check_storage(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    let result = state.storage.get_topologies_for_worker("").await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => ComponentHealth {
            name: "storage".to_string(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: Some(latency_ms),
        },
        Err(e) => ComponentHealth {
            name: "storage".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
            latency_ms: Some(latency_ms),
        },
    }
}

/// Returns 200 while the process is running
async fn liveness_probe() -> impl IntoResponse {
    let response = LivenessResponse {
        status: HealthStatus::Healthy,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Returns 200 once the server is serving and the store answers
async fn readiness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = vec![check_storage(&state).await];

    if !state.health.is_ready() {
        checks.push(ComponentHealth {
            name: "startup".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some("not serving yet".to_string()),
            latency_ms: None,
        });
    }

    let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let response = ReadinessResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    };

    (status.status_code(), Json(response))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = vec![check_storage(&state).await];
    let mut overall = checks[0].status;

    // Reading statuses runs the sweeps; that is what an operator expects here
    match state.storage.get_worker_status().await {
        Ok(workers) => {
            let alive = workers.iter().filter(|w| w.is_alive()).count();
            let status = if alive > 0 || workers.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            };
            if status == HealthStatus::Degraded && overall == HealthStatus::Healthy {
                overall = HealthStatus::Degraded;
            }
            checks.push(ComponentHealth {
                name: "workers".to_string(),
                status,
                message: Some(format!("{} total, {} alive", workers.len(), alive)),
                latency_ms: None,
            });
        }
        Err(e) => {
            overall = HealthStatus::Unhealthy;
            checks.push(ComponentHealth {
                name: "workers".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                latency_ms: None,
            });
        }
    }

    let response = HealthResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    };

    (overall.status_code(), Json(response))
}

// ============================================================================
// Tests
// ============================================================================
