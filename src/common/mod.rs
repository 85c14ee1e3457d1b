//! Common utilities and types shared across minidfs

pub mod config;
pub mod error;
pub mod proto;
pub mod utils;

pub use config::{Config, CoordinatorConfig, StorageConfig};
pub use error::{Error, Result};
pub use proto::{ChunkAllocation, CoordinatorRequest, NodeAddress, StatusReply, StorageRequest};
pub use utils::{chunk_count, chunk_id, format_bytes, timestamp_now, validate_chunk_id};
