//! Directory traversal for manifest generation.
//!
//! Only regular files are reported. Problems below the root (unreadable
//! directories, entries that vanish mid-walk, link loops) are logged and
//! counted, never fatal; only an unreadable root aborts the walk.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::metadata::FileMetadata;

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links to directories
    pub follow_links: bool,

    /// Entry names containing any of these are pruned (with their subtree)
    pub exclude_patterns: Vec<String>,
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the root, `/`-separated on every platform
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: f64,

    /// Reached through a symlink?
    pub is_symlink: bool,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// For symlinks, resolves to the target to get the real file size.
    /// Returns None for directories, broken symlinks and special files.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let is_symlink = entry.path_is_symlink();

        let metadata = match FileMetadata::from_path(&path) {
            Ok(m) => m,
            Err(e) if is_symlink => {
                debug!("Skipping broken symlink {}: {}", path.display(), e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !metadata.is_file {
            return Ok(None);
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);

        Ok(Some(Self {
            relative_path: to_manifest_path(relative),
            path,
            size: metadata.size,
            modified: metadata.modified,
            is_symlink,
        }))
    }
}

/// Counters for entries the walk could not report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Regular files handed to the callback
    pub files: usize,

    /// Entries skipped because of an error
    pub errors: usize,
}

/// Walk a directory tree, calling `callback` for every regular file.
///
/// # Returns
/// * `Ok(WalkSummary)` - How many files were reported and how many entries failed
/// * `Err(io::Error)` - If the root itself cannot be read
pub fn walk_files<F>(root: &Path, options: &WalkOptions, mut callback: F) -> std::io::Result<WalkSummary>
where
    F: FnMut(FileInfo),
{
    let mut summary = WalkSummary::default();

    let patterns = &options.exclude_patterns;
    let entries = WalkDir::new(root)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_exclude(e, patterns));

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                summary.errors += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match FileInfo::from_entry(&entry, root) {
            Ok(Some(file_info)) => {
                summary.files += 1;
                callback(file_info);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to stat {}: {}", entry.path().display(), e);
                summary.errors += 1;
            }
        }
    }

    Ok(summary)
}

/// Render a relative path with forward slashes regardless of platform.
pub fn to_manifest_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        walk_files(root, options, |f| files.push(f))?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("subdir/nested"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/nested/file2.txt"), b"content22")?;

        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, "file1.txt");
        assert_eq!(files[1].relative_path, "subdir/nested/file2.txt");
        assert_eq!(files[1].size, 9);

        Ok(())
    }

    #[test]
    fn test_exclude_patterns_prune_subtree() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join(".snapshot"))?;
        fs::write(temp_dir.path().join(".snapshot/old.txt"), b"old")?;
        fs::write(temp_dir.path().join("file.txt"), b"keep")?;

        let options = WalkOptions {
            exclude_patterns: vec![".snapshot".to_string()],
            ..WalkOptions::default()
        };
        let files = collect(temp_dir.path(), &options)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "file.txt");

        Ok(())
    }

    #[test]
    fn test_default_options_keep_dotfiles() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".DS_Store"), b"finder")?;

        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 1);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_resolved_to_files_only() -> std::io::Result<()> {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("dir"))?;
        fs::write(root.join("dir/target.txt"), b"target")?;
        symlink(root.join("dir/target.txt"), root.join("link.txt"))?;
        symlink(root.join("dir"), root.join("dirlink"))?;
        symlink(root.join("missing"), root.join("broken"))?;

        let files = collect(root, &WalkOptions::default())?;
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["dir/target.txt", "link.txt"]);
        assert!(files[1].is_symlink);
        assert_eq!(files[1].size, 6);

        Ok(())
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = walk_files(&temp_dir.path().join("nope"), &WalkOptions::default(), |_| {});
        assert!(result.is_err());
    }

    #[test]
    fn test_manifest_path_uses_forward_slashes() {
        let rel: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(to_manifest_path(&rel), "a/b/c.txt");
    }
}
