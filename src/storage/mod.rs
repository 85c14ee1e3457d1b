//! Storage node implementation
//!
//! A storage node is a keyed blob store reachable over the network plus a
//! background liveness reporter. It holds no cross-chunk knowledge of file
//! identity; the coordinator owns all of that.

pub mod chunks;
pub mod heartbeat;
pub mod server;

pub use chunks::ChunkStore;
pub use heartbeat::HeartbeatReporter;
pub use server::StorageServer;
