//! Chunk store: keyed raw-blob storage under one directory
//!
//! No knowledge of files, placements, or replication: each chunk id maps
//! to one file in the storage directory. Writes stream into a `.partial`
//! temp file and rename over the final blob, so a peer that disconnects
//! mid-transfer never leaves a partial blob looking complete. A per-chunk
//! lock is held across a full store and a full read, so readers wait out
//! an in-flight store instead of observing partial bytes.

use crate::common::{proto, utils, Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

pub struct ChunkStore {
    dir: PathBuf,
    max_chunk_size: u64,
    // One entry per distinct chunk id ever touched; never pruned.
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChunkStore {
    /// Open (creating if needed) the storage directory.
    pub fn open(dir: impl AsRef<Path>, max_chunk_size: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_chunk_size,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn guard(&self, chunk_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(chunk_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn blob_path(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(chunk_id)
    }

    fn partial_path(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(format!("{}.partial", chunk_id))
    }

    /// Read exactly `chunk_size` bytes from `src` and store them as
    /// `chunk_id`, overwriting any prior blob of the same name.
    ///
    /// Id and size validation happen before any byte is consumed off
    /// `src`, so on those errors the connection is still framed.
    pub async fn store_from<R>(&self, chunk_id: &str, chunk_size: u64, src: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        utils::validate_chunk_id(chunk_id)?;
        if chunk_size > self.max_chunk_size {
            return Err(Error::ChunkTooLarge {
                size: chunk_size,
                max: self.max_chunk_size,
            });
        }

        let guard = self.guard(chunk_id);
        let _held = guard.lock().await;

        let partial = self.partial_path(chunk_id);
        let mut file = fs::File::create(&partial).await?;

        let received = async {
            proto::copy_exact(src, &mut file, chunk_size).await?;
            file.sync_all().await?;
            Ok::<_, Error>(())
        }
        .await;

        drop(file);
        if let Err(e) = received {
            let _ = fs::remove_file(&partial).await;
            tracing::warn!("Discarded partial chunk {}: {}", chunk_id, e);
            return Err(e);
        }

        fs::rename(&partial, self.blob_path(chunk_id)).await?;
        tracing::info!(
            "Stored chunk {} ({})",
            chunk_id,
            utils::format_bytes(chunk_size)
        );
        Ok(())
    }

    /// Stream a stored chunk to `dst`: the 8-byte big-endian length
    /// header, then the raw bytes. A missing blob is reported before
    /// anything is written to `dst`.
    pub async fn send_chunk<W>(&self, chunk_id: &str, dst: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        utils::validate_chunk_id(chunk_id)?;

        let guard = self.guard(chunk_id);
        let _held = guard.lock().await;

        let path = self.blob_path(chunk_id);
        let mut file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ChunkNotFound(chunk_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        proto::write_chunk_header(dst, len).await?;
        proto::copy_exact(&mut file, dst, len).await?;
        tracing::debug!("Served chunk {} ({})", chunk_id, utils::format_bytes(len));
        Ok(())
    }
}
