//! Prometheus metrics for the coordination service and workers
//!
//! This module provides metrics tracking for:
//! - Coordination service: API requests, registered workers, topologies by status
//! - Workers: delivered messages, topology reports, leadership changes, child exits
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for coordination service metrics
struct ServiceMetrics {
    alive_workers: Gauge,
    topologies: GaugeVec,
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

/// Container for worker-side metrics
struct WorkerMetrics {
    messages_delivered: CounterVec,
    topology_reports: CounterVec,
    report_failures: CounterVec,
    leadership_changes: CounterVec,
    proxy_exits: CounterVec,
    running_topologies: GaugeVec,
}

static SERVICE_METRICS: OnceLock<ServiceMetrics> = OnceLock::new();

static WORKER_METRICS: OnceLock<WorkerMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
/// If registration fails, subsequent metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let service = ServiceMetrics {
        alive_workers: register_gauge!(
            "topovisor_alive_workers",
            "Number of workers reported alive by the last status read"
        )?,
        topologies: register_gauge_vec!(
            "topovisor_topologies",
            "Number of topologies by status as of the last status read",
            &["status"]
        )?,
        api_requests: register_counter_vec!(
            "topovisor_api_requests_total",
            "Total coordination API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "topovisor_api_request_duration_seconds",
            "Coordination API request duration in seconds",
            &["endpoint"],
            vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
        )?,
    };

    let worker = WorkerMetrics {
        messages_delivered: register_counter_vec!(
            "topovisor_messages_delivered_total",
            "Messages drained from the coordination store by command",
            &["worker", "cmd"]
        )?,
        topology_reports: register_counter_vec!(
            "topovisor_topology_reports_total",
            "Topology status reports sent by workers",
            &["status"]
        )?,
        report_failures: register_counter_vec!(
            "topovisor_report_failures_total",
            "Status reports that could not be stored",
            &["kind"]
        )?,
        leadership_changes: register_counter_vec!(
            "topovisor_leadership_changes_total",
            "Leadership transitions observed by workers",
            &["worker", "change"]
        )?,
        proxy_exits: register_counter_vec!(
            "topovisor_proxy_exits_total",
            "Engine child process exits by outcome",
            &["outcome"]
        )?,
        running_topologies: register_gauge_vec!(
            "topovisor_worker_running_topologies",
            "Topologies currently supervised by a worker",
            &["worker"]
        )?,
    };

    SERVICE_METRICS
        .set(service)
        .map_err(|_| "Service metrics already initialized")?;
    WORKER_METRICS
        .set(worker)
        .map_err(|_| "Worker metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SERVICE_METRICS.get().is_some() && WORKER_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Service
// ============================================================================

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = SERVICE_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Update the worker gauge from a status snapshot
pub fn update_worker_gauge(alive: usize) {
    if let Some(m) = SERVICE_METRICS.get() {
        m.alive_workers.set(alive as f64);
    }
}

/// Update the per-status topology gauge from a status snapshot
pub fn update_topology_gauge(counts: &[(&str, usize)]) {
    let Some(m) = SERVICE_METRICS.get() else {
        return;
    };

    for (status, count) in counts {
        m.topologies.with_label_values(&[status]).set(*count as f64);
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Record one drained message
pub fn record_message_delivered(worker: &str, cmd: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.messages_delivered.with_label_values(&[worker, cmd]).inc();
    }
}

/// Record a topology status report
pub fn record_topology_report(status: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.topology_reports.with_label_values(&[status]).inc();
    }
}

/// Record a report the store rejected or never received
pub fn record_report_failure(kind: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.report_failures.with_label_values(&[kind]).inc();
    }
}

/// Record a leadership gain or loss
pub fn record_leadership_change(worker: &str, change: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.leadership_changes
            .with_label_values(&[worker, change])
            .inc();
    }
}

/// Record an engine child exit
pub fn record_proxy_exit(clean: bool) {
    if let Some(m) = WORKER_METRICS.get() {
        let outcome = if clean { "clean" } else { "abnormal" };
        m.proxy_exits.with_label_values(&[outcome]).inc();
    }
}

/// Set the number of topologies a worker supervises
pub fn set_running_topologies(worker: &str, count: usize) {
    if let Some(m) = WORKER_METRICS.get() {
        m.running_topologies
            .with_label_values(&[worker])
            .set(count as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================
