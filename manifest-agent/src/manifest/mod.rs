//! Manifest types and the on-disk document format.
//!
//! A manifest records every regular file of a tree with its size, mtime and
//! SHA-256 digest. The serialized form is a JSON array of entry objects:
//!
//! ```json
//! [
//!   { "path": "reports/q1.csv", "size": 1024, "mtime": 1718000000.25, "sha256": "9f86d0…" }
//! ]
//! ```
//!
//! Stored manifests outlive releases, so field names here must not change.

pub mod builder;
pub mod reconcile;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::errors::{AgentError, Result};

/// Metadata for a single file in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the scanned root, `/`-separated
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch). Informational, never compared.
    pub mtime: f64,

    /// Lowercase hex SHA-256 of the file content
    #[serde(rename = "sha256")]
    pub digest: String,
}

/// Path-keyed collection of entries, kept in discovery order.
///
/// Inserting a path that is already present replaces the earlier entry in
/// place: the last observation wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from entries, applying last-write-wins on duplicate paths.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ManifestEntry>,
    {
        let mut manifest = Self::new();
        for entry in entries {
            manifest.insert(entry);
        }
        manifest
    }

    /// Insert an entry. Returns the entry it replaced, if any.
    pub fn insert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        match self.index.get(&entry.path) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot], entry)),
            None => {
                self.index.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.index.get(path).map(|&slot| &self.entries[slot])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Sum of all entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Serialize to the document format (pretty-printed JSON array).
    pub fn to_document(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.entries)?)
    }

    /// Parse a document produced by [`Manifest::to_document`] (or any earlier
    /// generator writing the same format).
    ///
    /// # Errors
    ///
    /// Returns `AgentError::DataIntegrity` when the bytes are not a JSON array
    /// of complete entry objects.
    pub fn from_document(bytes: &[u8]) -> Result<Self> {
        let entries: Vec<ManifestEntry> = serde_json::from_slice(bytes)
            .map_err(|e| AgentError::DataIntegrity(format!("invalid manifest document: {}", e)))?;
        Ok(Self::from_entries(entries))
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
pub(crate) fn entry(path: &str, size: u64, digest: &str) -> ManifestEntry {
    ManifestEntry {
        path: path.to_string(),
        size,
        mtime: 0.0,
        digest: digest.to_string(),
    }
}
