//! Storage node binary

use anyhow::Result;
use clap::Parser;
use minidfs::{Config, StorageConfig, StorageServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "minidfs-node")]
#[command(about = "minidfs storage node - chunk blob store")]
#[command(version)]
struct Args {
    /// Bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Externally reachable host announced in heartbeats
    #[arg(long)]
    advertise_host: Option<String>,

    /// Externally reachable port announced in heartbeats (defaults to the
    /// bind port)
    #[arg(long)]
    advertise_port: Option<u16>,

    /// Directory for chunk blobs
    #[arg(long)]
    data: Option<PathBuf>,

    /// Coordinator address (host:port)
    #[arg(long)]
    coordinator: Option<String>,

    /// Seconds between heartbeats
    #[arg(long)]
    heartbeat_interval: Option<u64>,

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
    let mut config = Config::load().storage.unwrap_or_default();
    apply_overrides(&mut config, &args);

    StorageServer::new(config).serve().await?;
    Ok(())
}

fn apply_overrides(config: &mut StorageConfig, args: &Args) {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
        config.advertise_port = bind.port();
    }
    if let Some(host) = &args.advertise_host {
        config.advertise_host = host.clone();
    }
    if let Some(port) = args.advertise_port {
        config.advertise_port = port;
    }
    if let Some(data) = &args.data {
        config.storage_dir = data.clone();
    }
    if let Some(coordinator) = &args.coordinator {
        config.coordinator_addr = coordinator.clone();
    }
    if let Some(interval) = args.heartbeat_interval {
        config.heartbeat_interval_secs = interval;
    }
}
