//! Coordinator server
//!
//! Sole authority for file → chunk placement and the sole consumer of
//! liveness reports. One task per accepted connection; requests on a
//! connection are handled strictly in arrival order.

use crate::common::proto::{
    self, ChunkAllocation, CoordinatorRequest, DownloadOk, NodeAddress, StatusReply, UploadOk,
};
use crate::common::{utils, CoordinatorConfig, Error, Result};
use crate::coordinator::liveness::LivenessRegistry;
use crate::coordinator::metadata::{FileRecord, FileStatus, MetadataStore};
use crate::coordinator::placement::PlacementManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub struct Coordinator {
    config: CoordinatorConfig,
}

/// Shared coordinator state. The metadata map and the liveness registry
/// are guarded by two independent locks; the metadata lock is held across
/// each full read-modify-persist sequence.
struct CoordinatorState {
    metadata: Mutex<MetadataStore>,
    liveness: Mutex<LivenessRegistry>,
    placement: PlacementManager,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener).await
    }

    /// Accept loop over an already-bound listener (lets tests bind port 0).
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Starting coordinator");
        tracing::info!("  Listening on: {}", listener.local_addr()?);
        tracing::info!("  Metadata: {}", self.config.metadata_path.display());
        tracing::info!("  Replication factor: {}", self.config.replication_factor);
        tracing::info!(
            "  Liveness timeout: {}s",
            self.config.liveness_timeout_secs
        );

        let state = Arc::new(CoordinatorState {
            metadata: Mutex::new(MetadataStore::open(&self.config.metadata_path)?),
            liveness: Mutex::new(LivenessRegistry::new(self.config.liveness_timeout())),
            placement: PlacementManager::new(self.config.replication_factor),
        });

        tracing::info!("✓ Coordinator ready");

        loop {
            let (stream, peer) = listener.accept().await?;
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(state, stream, peer).await {
                    tracing::warn!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

/// Per-connection request loop. Protocol and domain errors are reported to
/// the peer and the loop continues; transport failures end it.
async fn handle_connection<S>(
    state: Arc<CoordinatorState>,
    mut stream: S,
    peer: SocketAddr,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!("Client connected: {}", peer);

    while let Some(payload) = proto::read_frame(&mut stream).await? {
        match proto::decode::<CoordinatorRequest>(&payload) {
            Ok(request) => dispatch(&state, request, &mut stream).await?,
            Err(e) => {
                tracing::debug!("Bad request from {}: {}", peer, e);
                proto::write_message(&mut stream, &StatusReply::error(&e)).await?;
            }
        }
    }

    tracing::debug!("Client disconnected: {}", peer);
    Ok(())
}

async fn dispatch<S>(
    state: &CoordinatorState,
    request: CoordinatorRequest,
    stream: &mut S,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match request {
        CoordinatorRequest::Upload {
            name,
            filesize,
            num_chunks,
        } => match allocate_upload(state, &name, filesize, num_chunks).await {
            Ok(allocations) => {
                proto::write_message(stream, &UploadOk::new(allocations)).await
            }
            Err(e) => {
                tracing::warn!("Upload of '{}' rejected: {}", name, e);
                proto::write_message(stream, &StatusReply::error(&e)).await
            }
        },

        CoordinatorRequest::Download { name } => match lookup_chunks(state, &name).await {
            Ok(chunks) => proto::write_message(stream, &DownloadOk::new(chunks)).await,
            Err(e) => proto::write_message(stream, &StatusReply::error(&e)).await,
        },

        CoordinatorRequest::UploadComplete { filename, filesize } => {
            match confirm_upload(state, &filename, filesize).await {
                Ok(message) => proto::write_message(stream, &StatusReply::ok(message)).await,
                Err(e) => proto::write_message(stream, &StatusReply::error(&e)).await,
            }
        }

        CoordinatorRequest::Heartbeat {
            datanode_host,
            datanode_port,
        } => {
            let addr = NodeAddress::new(datanode_host, datanode_port);
            state.liveness.lock().await.record(addr);
            proto::write_message(stream, &StatusReply::heartbeat_ack()).await
        }
    }
}

/// Allocate placements for every chunk of an upload, then persist the
/// pending record. Any allocation failure aborts the whole request before
/// anything is recorded.
async fn allocate_upload(
    state: &CoordinatorState,
    name: &str,
    filesize: u64,
    num_chunks: u32,
) -> Result<Vec<ChunkAllocation>> {
    let candidates = state.liveness.lock().await.candidates();

    let mut allocations = Vec::with_capacity(num_chunks as usize);
    for index in 0..num_chunks {
        let datanodes = state.placement.allocate(index, &candidates)?;
        allocations.push(ChunkAllocation {
            chunk_id: utils::chunk_id(name, index),
            datanodes,
        });
    }

    let mut metadata = state.metadata.lock().await;
    metadata.insert(name, FileRecord::pending(filesize, allocations.clone()))?;
    tracing::info!(
        "Allocated {} chunk(s) for '{}' ({})",
        num_chunks,
        name,
        utils::format_bytes(filesize)
    );
    Ok(allocations)
}

/// Look up a file's chunk list. Only confirmed uploads are downloadable.
async fn lookup_chunks(state: &CoordinatorState, name: &str) -> Result<Vec<ChunkAllocation>> {
    let metadata = state.metadata.lock().await;
    let record = metadata
        .get(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;
    if record.status != FileStatus::Complete {
        return Err(Error::UploadIncomplete(name.to_string()));
    }
    Ok(record.chunks.clone())
}

async fn confirm_upload(state: &CoordinatorState, name: &str, filesize: u64) -> Result<String> {
    let mut metadata = state.metadata.lock().await;
    if let Some(record) = metadata.get(name) {
        if record.size != filesize {
            tracing::warn!(
                "upload_complete for '{}' reports {} bytes, {} were allocated",
                name,
                filesize,
                record.size
            );
        }
    }
    metadata.set_complete(name)?;
    tracing::info!("Upload of '{}' confirmed", name);
    Ok(format!("Upload of '{}' confirmed", name))
}
