//! Coordinator binary

use anyhow::Result;
use clap::Parser;
use minidfs::{Config, Coordinator, CoordinatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "minidfs-coord")]
#[command(about = "minidfs coordinator - metadata and placement authority")]
#[command(version)]
struct Args {
    /// Bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Metadata snapshot file
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Replication factor
    #[arg(long)]
    replicas: Option<usize>,

    /// Seconds without a heartbeat before a node leaves the allocation pool
    #[arg(long)]
    liveness_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // File config first, CLI flags win.
    let mut config = Config::load().coordinator.unwrap_or_default();
    apply_overrides(&mut config, &args);

    Coordinator::new(config).serve().await?;
    Ok(())
}

fn apply_overrides(config: &mut CoordinatorConfig, args: &Args) {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(metadata) = &args.metadata {
        config.metadata_path = metadata.clone();
    }
    if let Some(replicas) = args.replicas {
        config.replication_factor = replicas;
    }
    if let Some(timeout) = args.liveness_timeout {
        config.liveness_timeout_secs = timeout;
    }
}
