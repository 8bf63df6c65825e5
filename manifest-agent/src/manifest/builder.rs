//! Manifest generation for a directory tree.
//!
//! [`build`] walks the tree and hashes every regular file. A file that cannot
//! be hashed is logged and left out; only a missing or non-directory root
//! aborts the build. [`persist`] writes the result locally and can stage a
//! copy in an object store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::store::{object_key, ObjectStore};
use super::{Manifest, ManifestEntry};
use crate::fs::digest::{digest_file, DEFAULT_CHUNK_SIZE};
use crate::fs::walker::{walk_files, WalkOptions};
use crate::utils::errors::{AgentError, Result};

/// Options controlling a scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Bytes read per digest chunk
    pub chunk_size: usize,

    /// Follow symlinks into directories
    pub follow_links: bool,

    /// Entry names containing any of these are skipped with their subtree
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_links: false,
            exclude_patterns: Vec::new(),
        }
    }
}

/// Counters from one build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Files hashed into the manifest
    pub files: usize,

    /// Files or entries left out because of an error
    pub skipped: usize,

    /// Bytes hashed
    pub bytes: u64,

    pub duration_secs: u64,
}

/// Build a manifest of every regular file under `root`.
///
/// # Errors
///
/// * `AgentError::RootNotFound` - `root` does not exist
/// * `AgentError::NotADirectory` - `root` is not a directory
/// * `AgentError::Io` - `root` exists but cannot be listed
pub fn build(root: &Path, options: &ScanOptions) -> Result<(Manifest, BuildSummary)> {
    let start_time = Instant::now();

    let root_meta = std::fs::metadata(root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AgentError::RootNotFound(root.to_path_buf())
        } else {
            AgentError::Io(e)
        }
    })?;
    if !root_meta.is_dir() {
        return Err(AgentError::NotADirectory(root.to_path_buf()));
    }

    info!("Starting manifest generation for {}", root.display());

    let walk_options = WalkOptions {
        follow_links: options.follow_links,
        exclude_patterns: options.exclude_patterns.clone(),
    };

    let mut manifest = Manifest::new();
    let mut summary = BuildSummary::default();

    let walk = walk_files(root, &walk_options, |file| {
        let digest = match digest_file(&file.path, options.chunk_size) {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Skipping {} due to hashing error: {}", file.path.display(), e);
                summary.skipped += 1;
                return;
            }
        };

        debug!("Added {} to manifest", file.relative_path);
        summary.bytes += file.size;
        manifest.insert(ManifestEntry {
            path: file.relative_path,
            size: file.size,
            mtime: file.modified,
            digest,
        });
    })?;

    summary.skipped += walk.errors;
    summary.files = manifest.len();
    summary.duration_secs = start_time.elapsed().as_secs();

    info!(
        "Manifest generation complete: {} files, {} bytes, {} skipped, {}s",
        summary.files, summary.bytes, summary.skipped, summary.duration_secs
    );

    Ok((manifest, summary))
}

/// Where to stage an uploaded copy of the manifest
#[derive(Clone)]
pub struct UploadTarget {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    /// Key prefix; the object is named after the local file
    pub prefix: String,
}

/// Result of the upload half of [`persist`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No upload target was given
    Skipped,
    Uploaded { bucket: String, key: String },
    /// Upload failed; the local file is still valid
    Failed(String),
}

impl UploadOutcome {
    /// Why a requested upload did not land, if it didn't.
    pub fn failure(&self) -> Option<&str> {
        match self {
            UploadOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// What [`persist`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub local_path: PathBuf,
    pub upload: UploadOutcome,
}

/// Write `manifest` to `local_path` and optionally upload it.
///
/// The upload key is `prefix/<file name of local_path>`. An upload failure is
/// reported in the outcome and does not invalidate the local artifact.
///
/// # Errors
///
/// Returns an error (and skips the upload) if the local file cannot be written.
pub async fn persist(
    manifest: &Manifest,
    local_path: &Path,
    upload: Option<&UploadTarget>,
) -> Result<PersistOutcome> {
    let document = manifest.to_document()?;

    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, &document).await.map_err(|e| {
        error!("Error saving manifest to {}: {}", local_path.display(), e);
        AgentError::Io(e)
    })?;
    info!("Manifest saved locally to {}", local_path.display());

    let upload = match upload {
        None => UploadOutcome::Skipped,
        Some(target) => {
            let name = local_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "manifest.json".to_string());
            let key = object_key(&target.prefix, &name);

            match target.store.put_object(&target.bucket, &key, document).await {
                Ok(()) => {
                    info!("Manifest uploaded to {}/{}", target.bucket, key);
                    UploadOutcome::Uploaded {
                        bucket: target.bucket.clone(),
                        key,
                    }
                }
                Err(e) => {
                    error!("Error uploading manifest to {}/{}: {}", target.bucket, key, e);
                    UploadOutcome::Failed(e.to_string())
                }
            }
        }
    };

    Ok(PersistOutcome {
        local_path: local_path.to_path_buf(),
        upload,
    })
}
