//! Storage node server
//!
//! Serves the chunk store over the framed protocol and keeps the liveness
//! reporter running in the background. One task per accepted connection.

use crate::common::proto::{self, StatusReply, StorageRequest};
use crate::common::{Error, Result, StorageConfig};
use crate::storage::chunks::ChunkStore;
use crate::storage::heartbeat::HeartbeatReporter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

pub struct StorageServer {
    config: StorageConfig,
}

impl StorageServer {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener).await
    }

    /// Accept loop over an already-bound listener (lets tests bind port 0).
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Starting storage node");
        tracing::info!("  Listening on: {}", listener.local_addr()?);
        tracing::info!("  Advertised as: {}", self.config.advertise_addr());
        tracing::info!("  Storage dir: {}", self.config.storage_dir.display());
        tracing::info!("  Coordinator: {}", self.config.coordinator_addr);

        let store = Arc::new(ChunkStore::open(
            &self.config.storage_dir,
            self.config.max_chunk_size,
        )?);

        if self.config.heartbeat_interval_secs > 0 {
            let reporter = HeartbeatReporter::new(
                self.config.coordinator_addr.clone(),
                self.config.advertise_addr(),
                self.config.heartbeat_interval(),
            );
            tokio::spawn(reporter.run());
        } else {
            tracing::warn!("Liveness reporter disabled (heartbeat interval is 0)");
        }

        tracing::info!("✓ Storage node ready");

        loop {
            let (stream, peer) = listener.accept().await?;
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(store, stream, peer).await {
                    tracing::warn!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

/// Per-connection request loop. Unknown message types and misses are
/// reported to the peer and the loop continues; transport failures and
/// desynchronized streams end it.
async fn handle_connection<S>(store: Arc<ChunkStore>, mut stream: S, peer: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!("Client connected: {}", peer);

    while let Some(payload) = proto::read_frame(&mut stream).await? {
        match proto::decode::<StorageRequest>(&payload) {
            Ok(StorageRequest::FileChunk {
                chunk_id,
                chunk_size,
            }) => match store.store_from(&chunk_id, chunk_size, &mut stream).await {
                Ok(()) => {
                    let ack =
                        StatusReply::success(format!("Chunk {} stored successfully", chunk_id));
                    proto::write_message(&mut stream, &ack).await?;
                }
                Err(e @ Error::BadChunkId(_)) => {
                    // The declared bytes are still in flight; discard them
                    // so the stream stays framed for the error reply.
                    proto::copy_exact(&mut stream, &mut tokio::io::sink(), chunk_size).await?;
                    proto::write_message(&mut stream, &StatusReply::error(&e)).await?;
                }
                Err(e @ Error::ChunkTooLarge { .. }) => {
                    // Too much to discard; tell the peer, then drop the
                    // now-unframed connection.
                    let _ = proto::write_message(&mut stream, &StatusReply::error(&e)).await;
                    return Err(e);
                }
                // Mid-transfer failure: an unknown share of the raw bytes
                // was consumed, so the connection cannot be reused.
                Err(e) => return Err(e),
            },

            Ok(StorageRequest::GetFile { chunk_id }) => {
                match store.send_chunk(&chunk_id, &mut stream).await {
                    Ok(()) => {}
                    Err(e @ (Error::ChunkNotFound(_) | Error::BadChunkId(_))) => {
                        // Miss: structured error, no byte phase.
                        proto::write_message(&mut stream, &StatusReply::error(&e)).await?;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(e) => {
                tracing::debug!("Bad request from {}: {}", peer, e);
                proto::write_message(&mut stream, &StatusReply::error(&e)).await?;
            }
        }
    }

    tracing::debug!("Client disconnected: {}", peer);
    Ok(())
}
