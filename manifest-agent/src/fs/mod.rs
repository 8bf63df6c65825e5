//! File system access: tree walking, metadata and content digests.

pub mod digest;
pub mod metadata;
pub mod walker;
