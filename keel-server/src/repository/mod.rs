//! Repository Module
//!
//! Data access layer for the server. Pipelines live in memory for the
//! lifetime of the process; every access goes through [`Registry`].

pub mod registry;

// Re-export for convenience
pub use registry::{Registry, RegistryError};
