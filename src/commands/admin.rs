use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use topovisor::models::{LeadershipState, TopologyConfig};
use topovisor::storage::{SharedStorage, TopologyFile};
use topovisor::Error;

// ============================================================================
// Cluster Status
// ============================================================================

/// Print workers, topologies and leadership as tables
pub async fn status(storage: SharedStorage) -> Result<()> {
    let workers = storage
        .get_worker_status()
        .await
        .context("Failed to fetch worker status")?;
    let topologies = storage
        .get_topology_status()
        .await
        .context("Failed to fetch topology status")?;
    let leadership = storage
        .get_leadership_status()
        .await
        .context("Failed to fetch leadership status")?;

    println!("Leadership: {leadership}");
    println!();

    println!("Workers ({})", workers.len());
    println!("{:<28} {:<10} {:<10} {:<25}", "NAME", "STATUS", "LEADER", "LAST PING");
    println!("{:-<76}", "");
    for worker in &workers {
        let lstatus = match worker.lstatus {
            LeadershipState::None => "-",
            LeadershipState::Pending | LeadershipState::Candidate => "pending",
            LeadershipState::Leader => "leader",
        };
        println!(
            "{:<28} {:<10} {:<10} {:<25}",
            worker.name,
            worker.status,
            lstatus,
            worker.last_ping.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    println!("Topologies ({})", topologies.len());
    println!("{:<28} {:<12} {:<28} ERROR", "UUID", "STATUS", "WORKER");
    println!("{:-<80}", "");
    for topology in &topologies {
        println!(
            "{:<28} {:<12} {:<28} {}",
            topology.uuid,
            topology.status,
            topology.worker.as_deref().unwrap_or("-"),
            topology.error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

// ============================================================================
// Topology Administration
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TopologyCommand {
    /// Register (or replace) a topology definition from a JSON file
    Register {
        /// Definition file
        file: PathBuf,

        /// Topology uuid (defaults to the file stem)
        #[arg(long)]
        uuid: Option<String>,

        /// Enable right after registering
        #[arg(long, default_value = "false")]
        enable: bool,
    },

    /// Make a topology eligible for assignment
    Enable { uuid: String },

    /// Take a topology out of rotation
    Disable { uuid: String },

    /// Stop a running topology
    Stop { uuid: String },

    /// Remove an inactive topology
    Delete { uuid: String },

    /// Move an errored topology back to unassigned
    ClearError { uuid: String },

    /// Assign a topology to a specific worker
    Assign { uuid: String, worker: String },

    /// Show one topology
    Info { uuid: String },
}

/// Run one topology administration command
pub async fn topology(storage: SharedStorage, command: TopologyCommand) -> Result<()> {
    match command {
        TopologyCommand::Register { file, uuid, enable } => {
            let loaded = TopologyFile::load(&file)
                .await
                .map_err(|e| Error::with_source(format!("Failed to load {}", file.display()), e))?;

            let (uuid, config): (String, TopologyConfig) = match (uuid, loaded) {
                (Some(uuid), Some(loaded)) => (uuid, loaded.config),
                (None, Some(loaded)) => (loaded.uuid, loaded.config),
                (Some(_), None) | (None, None) => {
                    return Err(Error::other(format!(
                        "Cannot derive a topology uuid from {}; pass --uuid",
                        file.display()
                    ))
                    .into());
                }
            };

            storage.register_topology(&uuid, config).await?;
            println!("Registered topology {uuid}");

            if enable {
                storage.enable_topology(&uuid).await?;
                println!("Enabled topology {uuid}");
            }
        }
        TopologyCommand::Enable { uuid } => {
            storage.enable_topology(&uuid).await?;
            println!("Enabled topology {uuid}");
        }
        TopologyCommand::Disable { uuid } => {
            storage.disable_topology(&uuid).await?;
            println!("Disabled topology {uuid}");
        }
        TopologyCommand::Stop { uuid } => {
            storage.stop_topology(&uuid).await?;
            println!("Stop requested for topology {uuid}");
        }
        TopologyCommand::Delete { uuid } => {
            storage.delete_topology(&uuid).await?;
            println!("Deleted topology {uuid}");
        }
        TopologyCommand::ClearError { uuid } => {
            storage.clear_topology_error(&uuid).await?;
            println!("Cleared error on topology {uuid}");
        }
        TopologyCommand::Assign { uuid, worker } => {
            storage.assign_topology(&uuid, &worker).await?;
            println!("Assigned topology {uuid} to {worker}");
        }
        TopologyCommand::Info { uuid } => {
            let record = storage.get_topology_info(&uuid).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

/// Queue a shutdown message for a worker
pub async fn shut_down_worker(storage: SharedStorage, name: &str) -> Result<()> {
    storage
        .shut_down_worker(name)
        .await
        .with_context(|| format!("Failed to shut down worker {name}"))?;
    println!("Shutdown queued for worker {name}");
    Ok(())
}
