//! Configuration management for the manifest agent.
//!
//! Loads configuration from a TOML file; command-line flags override it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fs::digest::DEFAULT_CHUNK_SIZE;
use crate::manifest::builder::ScanOptions;
use crate::utils::errors::{AgentError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Digest read size in bytes (default: 8KB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Follow symlinks into directories
    #[serde(default)]
    pub follow_links: bool,

    /// Entry names containing any of these are skipped
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bucket manifests are uploaded to (no upload when unset)
    #[serde(default)]
    pub bucket: Option<String>,

    /// Key prefix for uploaded manifests
    #[serde(default)]
    pub prefix: String,

    /// HTTP object store base URL
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for the HTTP object store
    #[serde(default)]
    pub token: Option<String>,

    /// Local directory used as object store when no URL is set
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            follow_links: false,
            exclude: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))?;
        if config.scan.chunk_size == 0 {
            return Err(AgentError::Config("scan.chunk_size must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            chunk_size: self.scan.chunk_size,
            follow_links: self.scan.follow_links,
            exclude_patterns: self.scan.exclude.clone(),
        }
    }
}
