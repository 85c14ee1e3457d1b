//! # minidfs
//!
//! A minimal distributed file store:
//! - One coordinator owns the file → chunk → node placement map and tracks
//!   storage-node liveness via heartbeats
//! - Storage nodes hold chunk blobs on local disk and serve store/retrieve
//!   requests; they know nothing about files or placements
//! - A protocol client chunks files, pushes every chunk to every node in
//!   its placement, and reassembles downloads
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!                  │       Coordinator        │
//!                  │  file → chunk placements │
//!                  │  node liveness registry  │
//!                  │  JSON metadata snapshot  │
//!                  └─────┬──────────▲─────────┘
//!        allocate /      │          │  heartbeats
//!        download        │          │
//!   ┌────────┐           │   ┌──────┴──────┐   ┌─────────────┐
//!   │ Client ├───────────┘   │ Storage 1   │   │ Storage 2   │
//!   │        ├── chunks ────▶│ chunk blobs │   │ chunk blobs │
//!   └────────┘               └─────────────┘   └─────────────┘
//! ```
//!
//! Every connection speaks the same framed protocol: a 4-byte big-endian
//! length prefix plus a JSON payload, with raw chunk bytes traveling
//! outside the JSON on the store and retrieve paths.
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! minidfs-coord --bind 0.0.0.0:5000 --metadata ./coord-data/metadata.json --replicas 2
//! ```
//!
//! ### Start a storage node
//! ```bash
//! minidfs-node --bind 0.0.0.0:5001 --advertise-host 10.0.0.8 \
//!   --data ./node-data --coordinator 10.0.0.1:5000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minidfs put report.pdf --file ./report.pdf --coordinator 10.0.0.1:5000
//! minidfs get report.pdf --output ./report.pdf --coordinator 10.0.0.1:5000
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, CoordinatorConfig, Error, Result, StorageConfig};
pub use coordinator::Coordinator;
pub use storage::StorageServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
