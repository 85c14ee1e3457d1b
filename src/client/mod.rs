//! Protocol client
//!
//! Drives the coordinator and storage-node protocols from the outside:
//! one request/response per connection, a deadline on every request, and
//! the full upload/download flows (chunking, synchronous replication to
//! every node in a placement, per-chunk failover on download).

use crate::common::proto::{
    self, ChunkAllocation, CoordinatorRequest, DownloadOk, NodeAddress, StatusReply,
    StorageRequest, UploadOk,
};
use crate::common::{utils, Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Chunk size the original system uploads with.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Connect + full-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// === Coordinator client ===

pub struct CoordinatorClient {
    addr: String,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One framed request over a fresh connection.
    async fn request(&self, request: &CoordinatorRequest) -> Result<serde_json::Value> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            proto::write_message(&mut stream, request).await?;
            let payload = proto::read_frame(&mut stream).await?.ok_or_else(|| {
                Error::Transport("coordinator closed without replying".to_string())
            })?;
            serde_json::from_slice::<serde_json::Value>(&payload)
                .map_err(|e| Error::Protocol(e.to_string()))
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(format!("coordinator request to {}", self.addr)))?
    }

    /// Ask the coordinator to allocate placements for an upload.
    pub async fn allocate_upload(
        &self,
        name: &str,
        filesize: u64,
        num_chunks: u32,
    ) -> Result<Vec<ChunkAllocation>> {
        let value = self
            .request(&CoordinatorRequest::Upload {
                name: name.to_string(),
                filesize,
                num_chunks,
            })
            .await?;
        expect_status(&value, proto::STATUS_OK)?;
        let ok: UploadOk =
            serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(ok.chunk_allocations)
    }

    /// Fetch the placements of a previously uploaded file.
    pub async fn placements(&self, name: &str) -> Result<Vec<ChunkAllocation>> {
        let value = self
            .request(&CoordinatorRequest::Download {
                name: name.to_string(),
            })
            .await?;
        expect_status(&value, proto::STATUS_OK)?;
        let ok: DownloadOk =
            serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(ok.chunks)
    }

    /// Confirm that every chunk has been pushed.
    pub async fn confirm_upload(&self, name: &str, filesize: u64) -> Result<()> {
        let value = self
            .request(&CoordinatorRequest::UploadComplete {
                filename: name.to_string(),
                filesize,
            })
            .await?;
        expect_status(&value, proto::STATUS_OK)
    }

    /// Report a storage node as alive. Used by tests to stand in for a
    /// node's own reporter.
    pub async fn heartbeat(&self, host: &str, port: u16) -> Result<()> {
        let value = self
            .request(&CoordinatorRequest::Heartbeat {
                datanode_host: host.to_string(),
                datanode_port: port,
            })
            .await?;
        expect_status(&value, proto::STATUS_SUCCESS)
    }
}

/// Treat anything but the documented success literal as failure, carrying
/// the server's `message` verbatim.
fn expect_status(value: &serde_json::Value, expected: &str) -> Result<()> {
    match value.get("status").and_then(|s| s.as_str()) {
        Some(status) if status == expected => Ok(()),
        _ => {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unrecognized reply");
            Err(Error::Remote(message.to_string()))
        }
    }
}

// === Storage node client ===

#[derive(Clone)]
pub struct StorageClient {
    timeout: Duration,
}

impl Default for StorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Push one chunk: the `file_chunk` request, the raw bytes, the ack.
    pub async fn store_chunk(
        &self,
        node: &NodeAddress,
        chunk_id: &str,
        data: &[u8],
    ) -> Result<()> {
        let exchange = async {
            let mut stream = TcpStream::connect((node.host.as_str(), node.port)).await?;
            proto::write_message(
                &mut stream,
                &StorageRequest::FileChunk {
                    chunk_id: chunk_id.to_string(),
                    chunk_size: data.len() as u64,
                },
            )
            .await?;
            stream.write_all(data).await?;
            stream.flush().await?;

            let payload = proto::read_frame(&mut stream).await?.ok_or_else(|| {
                Error::Transport("storage node closed without acking".to_string())
            })?;
            let reply: StatusReply = proto::decode(&payload)?;
            if reply.status != proto::STATUS_SUCCESS {
                return Err(Error::Remote(
                    reply.message.unwrap_or_else(|| "store rejected".to_string()),
                ));
            }
            Ok(())
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(format!("store of {} to {}", chunk_id, node)))?
    }

    /// Fetch one chunk's bytes.
    ///
    /// A miss arrives as a 4-byte-framed JSON error, so its first word is
    /// the nonzero JSON length; a hit starts with the high word of the
    /// 8-byte chunk length, which is always zero because stored chunks are
    /// capped far below 4 GiB. One word read disambiguates.
    pub async fn fetch_chunk(&self, node: &NodeAddress, chunk_id: &str) -> Result<Vec<u8>> {
        let exchange = async {
            let mut stream = TcpStream::connect((node.host.as_str(), node.port)).await?;
            proto::write_message(
                &mut stream,
                &StorageRequest::GetFile {
                    chunk_id: chunk_id.to_string(),
                },
            )
            .await?;

            let mut word = [0u8; 4];
            read_wire(&mut stream, &mut word).await?;

            let high = u32::from_be_bytes(word);
            if high != 0 {
                if high > proto::MAX_FRAME_LEN {
                    return Err(Error::FrameTooLarge(high as u64));
                }
                let mut payload = vec![0u8; high as usize];
                read_wire(&mut stream, &mut payload).await?;
                let reply: StatusReply = proto::decode(&payload)?;
                return Err(Error::Remote(
                    reply.message.unwrap_or_else(|| "retrieve failed".to_string()),
                ));
            }

            read_wire(&mut stream, &mut word).await?;
            let len = u32::from_be_bytes(word) as usize;
            let mut data = vec![0u8; len];
            read_wire(&mut stream, &mut data).await?;
            Ok(data)
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(format!("fetch of {} from {}", chunk_id, node)))?
    }
}

async fn read_wire(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Transport("storage node closed mid reply".to_string())
        } else {
            Error::Io(e)
        }
    })?;
    Ok(())
}

// === Whole-file flows ===

/// Upload `path` under `name`: allocate placements, push every chunk to
/// every node in its placement list, then confirm. Returns the byte count.
pub async fn upload_file(
    coordinator: &CoordinatorClient,
    storage: &StorageClient,
    name: &str,
    path: &Path,
    chunk_size: u64,
) -> Result<u64> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk size must be positive".into()));
    }

    let mut file = tokio::fs::File::open(path).await?;
    let filesize = file.metadata().await?.len();
    let num_chunks = utils::chunk_count(filesize, chunk_size);

    let allocations = coordinator
        .allocate_upload(name, filesize, num_chunks)
        .await?;
    if allocations.len() != num_chunks as usize {
        return Err(Error::Protocol(format!(
            "coordinator allocated {} chunks, expected {}",
            allocations.len(),
            num_chunks
        )));
    }

    let mut remaining = filesize;
    for allocation in &allocations {
        let take = remaining.min(chunk_size);
        let mut buf = vec![0u8; take as usize];
        file.read_exact(&mut buf).await?;

        for node in &allocation.datanodes {
            storage
                .store_chunk(node, &allocation.chunk_id, &buf)
                .await?;
        }
        remaining -= take;
    }

    coordinator.confirm_upload(name, filesize).await?;
    tracing::info!(
        "Uploaded '{}' ({}, {} chunk(s))",
        name,
        utils::format_bytes(filesize),
        allocations.len()
    );
    Ok(filesize)
}

/// Download `name` into `dest`, trying each chunk's nodes in listed order.
/// Returns the byte count.
pub async fn download_file(
    coordinator: &CoordinatorClient,
    storage: &StorageClient,
    name: &str,
    dest: &Path,
) -> Result<u64> {
    let chunks = coordinator.placements(name).await?;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut total = 0u64;
    for chunk in &chunks {
        let data = fetch_with_failover(storage, chunk).await?;
        file.write_all(&data).await?;
        total += data.len() as u64;
    }
    file.flush().await?;

    tracing::info!(
        "Downloaded '{}' ({}, {} chunk(s))",
        name,
        utils::format_bytes(total),
        chunks.len()
    );
    Ok(total)
}

async fn fetch_with_failover(
    storage: &StorageClient,
    chunk: &ChunkAllocation,
) -> Result<Vec<u8>> {
    let mut last_err = None;
    for node in &chunk.datanodes {
        match storage.fetch_chunk(node, &chunk.chunk_id).await {
            Ok(data) => return Ok(data),
            Err(e) => {
                tracing::warn!("Fetch of {} from {} failed: {}", chunk.chunk_id, node, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::ChunkNotFound(chunk.chunk_id.clone())))
}
