use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topovisor::config::{Config, StorageConfig, StorageKind};

mod commands;

use commands::TopologyCommand;

#[derive(Parser)]
#[command(
    name = "topovisor",
    version,
    about = "Distributed stream-topology orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Which coordination store to talk to
#[derive(Args, Debug, Default)]
struct StorageArgs {
    /// Storage backend (memory, file, file-stub, http)
    #[arg(long)]
    storage: Option<StorageKind>,

    /// Coordination service base URL (http backend)
    #[arg(long)]
    storage_url: Option<String>,

    /// Topology directory (file backends)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Topology file pattern; repeatable
    #[arg(long = "pattern")]
    patterns: Vec<String>,
}

impl StorageArgs {
    fn apply(self, config: &mut StorageConfig) {
        if let Some(kind) = self.storage {
            config.kind = kind;
        }
        if let Some(url) = self.storage_url {
            config.url = Some(url);
        }
        if let Some(dir) = self.storage_dir {
            config.dir = Some(dir);
        }
        if !self.patterns.is_empty() {
            config.patterns = self.patterns;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP coordination service
    Serve {
        /// Bind address (e.g. 0.0.0.0:8080)
        #[arg(long)]
        bind: Option<String>,

        /// Load and enable every topology file in this directory at startup
        #[arg(long)]
        bootstrap_dir: Option<PathBuf>,

        /// Bootstrap file pattern; repeatable
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Disable CORS
        #[arg(long, default_value = "false")]
        no_cors: bool,

        /// Disable request logging
        #[arg(long, default_value = "false")]
        no_request_logging: bool,
    },

    /// Run a worker
    Worker {
        /// Worker name (generated when omitted)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        storage: StorageArgs,

        /// Engine executable started once per topology
        #[arg(long)]
        engine: Option<String>,

        /// Engine argument; repeatable
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,

        /// Message poll interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Leader tick interval in milliseconds
        #[arg(long)]
        leader_interval_ms: Option<u64>,
    },

    /// Show workers, topologies and leadership
    Status {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Administer topologies
    Topology {
        #[command(flatten)]
        storage: StorageArgs,

        #[command(subcommand)]
        command: TopologyCommand,
    },

    /// Ask a worker to shut down
    ShutDownWorker {
        /// Worker name
        name: String,

        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = topovisor::metrics::init_metrics() {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    match cli.command {
        Commands::Serve {
            bind,
            bootstrap_dir,
            patterns,
            no_cors,
            no_request_logging,
        } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind.parse().map_err(|_| {
                    topovisor::Error::config("server.bind_address", format!("Invalid address: {bind}"))
                })?;
            }
            if let Some(dir) = bootstrap_dir {
                config.server.bootstrap_dir = Some(dir);
            }
            if !patterns.is_empty() {
                config.server.bootstrap_patterns = patterns;
            }
            config.server.enable_cors &= !no_cors;
            config.server.enable_request_logging &= !no_request_logging;
            config.server.validate()?;

            tracing::info!(bind = %config.server.bind_address, "Starting serve command");
            commands::serve(config.server).await?;
        }

        Commands::Worker {
            name,
            storage,
            engine,
            engine_args,
            poll_interval_ms,
            leader_interval_ms,
        } => {
            if let Some(name) = name {
                config.worker.name = name;
            }
            storage.apply(&mut config.storage);
            if let Some(engine) = engine {
                config.worker.engine_command = engine;
            }
            if !engine_args.is_empty() {
                config.worker.engine_args = engine_args;
            }
            if let Some(ms) = poll_interval_ms {
                config.worker.poll_interval_ms = ms;
            }
            if let Some(ms) = leader_interval_ms {
                config.worker.leader_interval_ms = ms;
            }
            config.validate()?;

            tracing::info!(storage = %config.storage.kind, "Starting worker command");
            commands::worker(&config).await?;
        }

        Commands::Status { storage } => {
            storage.apply(&mut config.storage);
            commands::status(config.storage.connect().await?).await?;
        }

        Commands::Topology { storage, command } => {
            storage.apply(&mut config.storage);
            tracing::debug!(command = ?command, "Starting topology command");
            commands::topology(config.storage.connect().await?, command).await?;
        }

        Commands::ShutDownWorker { name, storage } => {
            storage.apply(&mut config.storage);
            commands::shut_down_worker(config.storage.connect().await?, &name).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("topovisor=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("topovisor={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
