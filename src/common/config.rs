//! Configuration for minidfs components
//!
//! Every tunable lives in an explicit config struct handed to the
//! component at construction; binaries merge an optional TOML file with
//! their CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::proto::NodeAddress;

/// Global configuration, loaded from `minidfs.toml` (or the file named by
/// `MINIDFS_CONFIG`) plus `MINIDFS_*` environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    /// Storage-node-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load file + environment configuration; missing file means defaults.
    pub fn load() -> Self {
        let name = std::env::var("MINIDFS_CONFIG").unwrap_or_else(|_| "minidfs".to_string());
        let loaded = config::Config::builder()
            .add_source(config::File::with_name(&name).required(false))
            .add_source(config::Environment::with_prefix("MINIDFS").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize());

        match loaded {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config: {}", e);
                Config::default()
            }
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the framed TCP listener
    pub bind_addr: SocketAddr,

    /// Path of the metadata snapshot file
    pub metadata_path: PathBuf,

    /// Nodes assigned to each chunk
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Heartbeat age beyond which a node leaves the allocation pool
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,
}

fn default_replication_factor() -> usize {
    2
}
fn default_liveness_timeout() -> u64 {
    30
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().unwrap(),
            metadata_path: PathBuf::from("./coord-data/metadata.json"),
            replication_factor: default_replication_factor(),
            liveness_timeout_secs: default_liveness_timeout(),
        }
    }
}

impl CoordinatorConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bind address for the framed TCP listener
    pub bind_addr: SocketAddr,

    /// Externally reachable host announced in heartbeats
    pub advertise_host: String,

    /// Externally reachable port announced in heartbeats
    pub advertise_port: u16,

    /// Directory holding chunk blobs
    pub storage_dir: PathBuf,

    /// Coordinator address for heartbeats (`host:port`)
    pub coordinator_addr: String,

    /// Seconds between liveness reports (0 disables the reporter)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Largest chunk a `file_chunk` request may declare
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
}

fn default_heartbeat_interval() -> u64 {
    10
}
fn default_max_chunk_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB, far below the 4 GiB framing limit
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".parse().unwrap(),
            advertise_host: "127.0.0.1".to_string(),
            advertise_port: 5001,
            storage_dir: PathBuf::from("./node-data"),
            coordinator_addr: "127.0.0.1:5000".to_string(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

impl StorageConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// The address this node announces to the coordinator.
    pub fn advertise_addr(&self) -> NodeAddress {
        NodeAddress::new(self.advertise_host.clone(), self.advertise_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let coord = CoordinatorConfig::default();
        assert_eq!(coord.replication_factor, 2);
        assert_eq!(coord.liveness_timeout(), Duration::from_secs(30));

        let storage = StorageConfig::default();
        assert_eq!(storage.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(storage.advertise_addr().port, 5001);
    }

    #[test]
    fn test_parse_toml_sections() {
        let raw = r#"
            log_level = "debug"

            [coordinator]
            bind_addr = "127.0.0.1:9000"
            metadata_path = "/tmp/meta.json"
            replication_factor = 3

            [storage]
            bind_addr = "127.0.0.1:9001"
            advertise_host = "10.0.0.8"
            advertise_port = 9001
            storage_dir = "/tmp/chunks"
            coordinator_addr = "127.0.0.1:9000"
        "#;

        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.log_level, "debug");
        let coord = cfg.coordinator.unwrap();
        assert_eq!(coord.replication_factor, 3);
        assert_eq!(coord.bind_addr.port(), 9000);
        let storage = cfg.storage.unwrap();
        assert_eq!(storage.advertise_host, "10.0.0.8");
        // Unset fields fall back to serde defaults.
        assert_eq!(storage.heartbeat_interval_secs, 10);
    }
}
