use anyhow::{Context, Result};
use std::sync::Arc;

use topovisor::config::Config;
use topovisor::{Error, TopovisorErrorTrait};
use topovisor::worker::{PassthroughCompiler, TopologyWorker};

use super::serve::shutdown_signal;

// ============================================================================
// Worker Process
// ============================================================================

/// Run one worker until the store or Ctrl+C shuts it down
pub async fn worker(config: &Config) -> Result<()> {
    let settings = config
        .worker
        .to_settings()
        .context("Invalid worker settings")?;
    let storage = config
        .storage
        .connect()
        .await
        .context("Failed to connect to coordination storage")?;

    println!("Starting Topology Worker");
    println!("========================");
    println!("  Name: {}", settings.name);
    println!("  Storage: {}", config.storage.kind);
    println!("  Engine: {} {}", settings.engine.program, settings.engine.args.join(" "));
    println!("  Poll Interval: {:?}", settings.poll_interval);
    println!("  Leader Interval: {:?}", settings.leader_interval);
    println!();

    let worker = TopologyWorker::new(settings, storage, Arc::new(PassthroughCompiler));

    let signal_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_worker.request_shutdown();
    });

    if let Err(e) = worker.run().await {
        let err = Error::from(e);
        tracing::error!(
            category = ?err.category(),
            recoverable = err.is_recoverable(),
            error = %err,
            "Worker failed"
        );
        return Err(err).context("Worker failed");
    }

    println!("Worker {} stopped.", worker.name());
    Ok(())
}
