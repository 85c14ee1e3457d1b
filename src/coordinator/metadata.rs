//! Durable metadata store: the file → FileRecord map
//!
//! The whole map is one JSON document. It is loaded once at startup and
//! rewritten wholesale after every successful mutation, via a temp file
//! and an atomic rename so a crash mid-save never truncates the snapshot.

use crate::common::proto::ChunkAllocation;
use crate::common::{utils, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Upload lifecycle of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Complete,
}

/// One entry per uploaded file name: total size, ordered chunk placements,
/// and whether the uploader ever confirmed completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub size: u64,
    pub chunks: Vec<ChunkAllocation>,
    pub status: FileStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl FileRecord {
    /// A freshly allocated record, awaiting `upload_complete`.
    pub fn pending(size: u64, chunks: Vec<ChunkAllocation>) -> Self {
        let now = utils::timestamp_now();
        Self {
            size,
            chunks,
            status: FileStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata store
pub struct MetadataStore {
    path: PathBuf,
    files: HashMap<String, FileRecord>,
}

impl MetadataStore {
    /// Open the store, loading the snapshot if one exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Metadata(format!("create {}: {}", parent.display(), e)))?;
            }
        }

        let files = if path.exists() {
            let raw = fs::read(&path)
                .map_err(|e| Error::Metadata(format!("read {}: {}", path.display(), e)))?;
            let files: HashMap<String, FileRecord> = serde_json::from_slice(&raw)
                .map_err(|e| Error::Metadata(format!("corrupt snapshot {}: {}", path.display(), e)))?;
            tracing::info!("Metadata loaded: {} entries", files.len());
            files
        } else {
            HashMap::new()
        };

        Ok(Self { path, files })
    }

    pub fn get(&self, name: &str) -> Option<&FileRecord> {
        self.files.get(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Insert (or overwrite) a record and persist the snapshot.
    pub fn insert(&mut self, name: &str, record: FileRecord) -> Result<()> {
        self.files.insert(name.to_string(), record);
        self.save()
    }

    /// Flip a record to `complete` and persist. The only status mutation.
    pub fn set_complete(&mut self, name: &str) -> Result<()> {
        let record = self
            .files
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        record.status = FileStatus::Complete;
        record.updated_at = utils::timestamp_now();
        self.save()
    }

    /// Serialize the whole map and atomically replace the snapshot.
    fn save(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.files)
            .map_err(|e| Error::Metadata(format!("serialize snapshot: {}", e)))?;

        let tmp = tmp_path(&self.path);
        let mut file = fs::File::create(&tmp)
            .map_err(|e| Error::Metadata(format!("create {}: {}", tmp.display(), e)))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::Metadata(format!("write {}: {}", tmp.display(), e)))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Metadata(format!("replace {}: {}", self.path.display(), e)))?;
        tracing::debug!("Metadata saved: {} entries", self.files.len());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
