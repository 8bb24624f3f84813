//! Core domain types
//!
//! This module contains the core domain structures used across keel crates.
//! The server holds them in its registry; clients receive them in snapshots.

pub mod pipeline;

pub use pipeline::{Pipeline, Stage, StageStatus};
