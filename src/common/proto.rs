//! Framed message protocol shared by every connection in the system.
//!
//! Control messages travel as a 4-byte unsigned big-endian length prefix
//! followed by exactly that many bytes of UTF-8 JSON. Chunk bodies bypass
//! JSON entirely: an upload's raw bytes follow the `file_chunk` request on
//! the same connection with no extra framing, and a retrieval reply is an
//! 8-byte big-endian length followed by the raw bytes.
//!
//! A reader blocks until the declared payload has fully arrived. A peer
//! that closes the connection before the first prefix byte is an orderly
//! shutdown (`Ok(None)`); one that closes mid-prefix or mid-payload is a
//! transport failure.

use crate::common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sanity cap on control-frame payloads. Past this the length prefix is
/// assumed corrupt and the stream cannot be re-framed.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Buffer size for the raw-chunk copy loops.
pub const COPY_BUF_LEN: usize = 64 * 1024;

pub const STATUS_OK: &str = "ok";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

// === Wire types ===

/// A storage node's listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Placement of one chunk: its id and the nodes assigned to hold it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAllocation {
    pub chunk_id: String,
    pub datanodes: Vec<NodeAddress>,
}

// === Requests ===

/// Requests understood by the coordinator, selected by the `action` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CoordinatorRequest {
    Upload {
        name: String,
        filesize: u64,
        num_chunks: u32,
    },
    Download {
        name: String,
    },
    UploadComplete {
        filename: String,
        filesize: u64,
    },
    Heartbeat {
        datanode_host: String,
        datanode_port: u16,
    },
}

/// Requests understood by a storage node, selected by `message_type`.
///
/// `FileChunk` is followed by exactly `chunk_size` raw bytes on the same
/// connection; the byte count in the request is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum StorageRequest {
    FileChunk { chunk_id: String, chunk_size: u64 },
    GetFile { chunk_id: String },
}

// === Replies ===

/// Successful `upload` reply: the ordered per-chunk allocation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOk {
    pub status: String,
    pub chunk_allocations: Vec<ChunkAllocation>,
}

impl UploadOk {
    pub fn new(chunk_allocations: Vec<ChunkAllocation>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            chunk_allocations,
        }
    }
}

/// Successful `download` reply: the file's chunk list, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOk {
    pub status: String,
    pub chunks: Vec<ChunkAllocation>,
}

impl DownloadOk {
    pub fn new(chunks: Vec<ChunkAllocation>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            chunks,
        }
    }
}

/// Ack-style reply carrying only a status and an optional message. Covers
/// `upload_complete` and `file_chunk` acks, heartbeat replies, and every
/// structured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: Some(message.into()),
        }
    }

    /// Heartbeat ack: bare `{status: "success"}`.
    pub fn heartbeat_ack() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: None,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: Some(message.to_string()),
        }
    }
}

// === Framing ===

/// Read one length-prefixed frame. `Ok(None)` means the peer shut down
/// cleanly between requests; a close mid-prefix or mid-payload is a
/// transport failure.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Transport(
                "peer closed mid length prefix".to_string(),
            ));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len as u64));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Transport(format!("peer closed mid payload ({} bytes expected)", len))
        } else {
            Error::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize `msg` as JSON and write it as one frame.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        serde_json::to_vec(msg).map_err(|e| Error::Protocol(format!("encode: {}", e)))?;
    write_frame(writer, &payload).await
}

/// Decode a frame payload into a typed request or reply. Unknown
/// discriminators and missing fields surface as protocol errors.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| Error::Protocol(e.to_string()))
}

/// Write the 8-byte big-endian length header that precedes a raw chunk
/// body on the retrieval path.
pub async fn write_chunk_header<W>(writer: &mut W, len: u64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&len.to_be_bytes()).await?;
    Ok(())
}

/// Pump exactly `len` raw bytes from `reader` to `writer` through a
/// fixed-size buffer. An early EOF is a transport failure.
pub async fn copy_exact<R, W>(reader: &mut R, writer: &mut W, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_LEN];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Transport(format!(
                "peer closed with {} of {} chunk bytes outstanding",
                remaining, len
            )));
        }
        writer.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, b"hello frame").await.unwrap();
        let got = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(got, b"hello frame");
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_payload_is_transport() {
        let (mut a, mut b) = tokio::io::duplex(64);
        // Declare 100 bytes but deliver only 3.
        a.write_all(&100u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_copy_exact_early_eof() {
        let mut src: &[u8] = b"short";
        let mut dst = Vec::new();
        let err = copy_exact(&mut src, &mut dst, 10).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_copy_exact_larger_than_buffer() {
        let data = vec![7u8; COPY_BUF_LEN * 3 + 17];
        let mut src: &[u8] = &data;
        let mut dst = Vec::new();
        copy_exact(&mut src, &mut dst, data.len() as u64)
            .await
            .unwrap();
        assert_eq!(dst, data);
    }

    #[test]
    fn test_request_wire_shape() {
        let req = CoordinatorRequest::Upload {
            name: "report.pdf".into(),
            filesize: 100,
            num_chunks: 2,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "upload");
        assert_eq!(json["num_chunks"], 2);

        let req = StorageRequest::GetFile {
            chunk_id: "report.pdf_chunk_0".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message_type"], "get_file");
    }

    #[test]
    fn test_unknown_action_is_protocol_error() {
        let err = decode::<CoordinatorRequest>(br#"{"action":"rename","name":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let err = decode::<StorageRequest>(br#"{"message_type":"file_chunk"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "missing field");
    }

    #[test]
    fn test_heartbeat_ack_has_no_message_field() {
        let json = serde_json::to_string(&StatusReply::heartbeat_ack()).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }
}
