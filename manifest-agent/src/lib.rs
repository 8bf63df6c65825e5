//! Manifest Agent Library
//!
//! Fingerprints a file tree into a content-addressed manifest, stages
//! manifests in an object store, and reconciles two manifests into a
//! discrepancy report.

pub mod config;
pub mod fs;
pub mod manifest;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use manifest::builder::{build, persist, ScanOptions};
pub use manifest::reconcile::{reconcile, DiscrepancyReport};
pub use manifest::store::{ManifestStore, ObjectStore};
pub use manifest::{Manifest, ManifestEntry};
pub use utils::errors::AgentError;
pub type Result<T> = std::result::Result<T, AgentError>;
