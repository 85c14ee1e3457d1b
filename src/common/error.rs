//! Error types for minidfs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Transport errors ===
    #[error("Transport failure: {0}")]
    Transport(String),

    // === Protocol errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u64),

    // === Domain errors ===
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Upload not complete: {0}")]
    UploadIncomplete(String),

    #[error("Insufficient live nodes: need {needed}, have {available}")]
    InsufficientReplicas { needed: usize, available: usize },

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Invalid chunk id: {0}")]
    BadChunkId(String),

    #[error("Chunk too large: {size} bytes (max {max})")]
    ChunkTooLarge { size: u64, max: u64 },

    // === Persistence errors ===
    #[error("Metadata error: {0}")]
    Metadata(String),

    // === Config errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Client-side errors ===
    #[error("{0}")]
    Remote(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Did the connection itself fail? Transport failures end the
    /// connection's request loop; everything else is reported back to the
    /// peer as a structured error reply.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Transport(_) | Error::Timeout(_))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
