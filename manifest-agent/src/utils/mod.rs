//! Utility modules for the manifest agent.

pub mod errors;
pub mod logger;

pub use errors::{AgentError, Result};
