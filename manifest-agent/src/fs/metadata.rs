//! File metadata captured for manifest entries.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata recorded for a scanned file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch, fractional)
    pub modified: f64,

    /// Is this a regular file once symlinks are resolved?
    pub is_file: bool,

    /// Is this a directory once symlinks are resolved?
    pub is_dir: bool,
}

impl FileMetadata {
    /// Extract metadata from a path, following symlinks.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        // Some filesystems do not report mtime; it is informational only.
        let modified = metadata
            .modified()
            .map(unix_seconds)
            .unwrap_or_default();

        Ok(Self {
            size: metadata.len(),
            modified,
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
        })
    }
}

/// Seconds since the Unix epoch; times before the epoch come out negative.
pub fn unix_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
