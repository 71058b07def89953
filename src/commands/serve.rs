use anyhow::{Context, Result};

use topovisor::coordinator::api::paths;
use topovisor::coordinator::{CoordinationServer, ServerConfig};

// ============================================================================
// Coordination Server
// ============================================================================

/// Start the HTTP coordination service
pub async fn serve(config: ServerConfig) -> Result<()> {
    let server = CoordinationServer::from_config(config)
        .await
        .context("Failed to create coordination server")?;

    println!("{}", server.info().display());
    println!();
    println!("Contract Endpoints (POST):");
    for path in [
        paths::REGISTER_WORKER,
        paths::WORKER_STATUSES,
        paths::TOPOLOGY_STATUSES,
        paths::WORKER_TOPOLOGIES,
        paths::LEADERSHIP_STATUS,
        paths::ANNOUNCE_LEADER_CANDIDACY,
        paths::CHECK_LEADER_CANDIDACY,
        paths::ASSIGN_TOPOLOGY,
        paths::SET_TOPOLOGY_STATUS,
        paths::SET_WORKER_STATUS,
        paths::GET_MESSAGES,
    ] {
        println!("  {path}");
    }
    println!("Admin Endpoints (POST):");
    for path in [
        paths::REGISTER_TOPOLOGY,
        paths::ENABLE_TOPOLOGY,
        paths::DISABLE_TOPOLOGY,
        paths::STOP_TOPOLOGY,
        paths::DELETE_TOPOLOGY,
        paths::CLEAR_TOPOLOGY_ERROR,
        paths::SHUT_DOWN_WORKER,
        paths::TOPOLOGY_INFO,
    ] {
        println!("  {path}");
    }
    println!("  GET /health, /health/live, /health/ready, /metrics");
    println!();
    println!("Press Ctrl+C to stop.\n");

    server.start_with_shutdown(shutdown_signal()).await?;

    println!("Coordination server stopped.");
    Ok(())
}

/// Resolves on Ctrl+C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Shutdown signal received");
        }
        Err(e) => {
            tracing::error!("Failed to wait for Ctrl+C: {}", e);
        }
    }
}
