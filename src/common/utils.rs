//! Utility functions for minidfs

use std::time::{SystemTime, UNIX_EPOCH};

/// Derive the id of chunk `index` of file `name`.
///
/// Two files with the same name collide on chunk ids; preventing that is
/// out of scope (file names are unique keys in the metadata store).
pub fn chunk_id(name: &str, index: u32) -> String {
    format!("{}_chunk_{}", name, index)
}

/// Number of chunks a `filesize`-byte file splits into at `chunk_size`.
/// A 0-byte file has 0 chunks.
pub fn chunk_count(filesize: u64, chunk_size: u64) -> u32 {
    filesize.div_ceil(chunk_size) as u32
}

/// Validate a chunk id before it is used as a file name inside the storage
/// directory. Rejects anything that could escape the directory or produce
/// an unopenable path.
pub fn validate_chunk_id(id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::BadChunkId("empty".into()));
    }
    if id.len() > 1024 {
        return Err(crate::Error::BadChunkId(format!(
            "too long ({} bytes)",
            id.len()
        )));
    }
    if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        return Err(crate::Error::BadChunkId(id.to_string()));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(crate::Error::BadChunkId("contains control characters".into()));
    }
    Ok(())
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id() {
        assert_eq!(chunk_id("report.pdf", 0), "report.pdf_chunk_0");
        assert_eq!(chunk_id("report.pdf", 12), "report.pdf_chunk_12");
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 64), 0);
        assert_eq!(chunk_count(1, 64), 1);
        assert_eq!(chunk_count(64, 64), 1);
        assert_eq!(chunk_count(65, 64), 2);
        assert_eq!(chunk_count(128, 64), 2);
    }

    #[test]
    fn test_validate_chunk_id() {
        assert!(validate_chunk_id("report.pdf_chunk_0").is_ok());
        assert!(validate_chunk_id("").is_err());
        assert!(validate_chunk_id("a/b").is_err());
        assert!(validate_chunk_id("a\\b").is_err());
        assert!(validate_chunk_id("..").is_err());
        assert!(validate_chunk_id("bad\x00id").is_err());
        assert!(validate_chunk_id(&"x".repeat(2000)).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }
}
