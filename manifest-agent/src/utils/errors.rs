//! Custom error types for the manifest agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single file could not be read to completion while hashing.
    #[error("Failed to hash {}: {source}", path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Scan root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Manifest document is malformed or missing expected fields.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Object store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
