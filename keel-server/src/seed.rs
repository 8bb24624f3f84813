//! Startup seeding of the registry from a JSON file

use std::path::Path;

use anyhow::Context;
use keel_core::domain::pipeline::Pipeline;
use tracing::info;

use crate::repository::Registry;

/// Parses a JSON array of pipelines
pub fn parse_seed(raw: &str) -> anyhow::Result<Vec<Pipeline>> {
    serde_json::from_str(raw).context("seed file is not a JSON array of pipelines")
}

/// Reads the seed file and builds a registry from it
///
/// Duplicate pipeline or stage ids are an error; nothing is half-loaded.
pub fn load_registry(path: &Path) -> anyhow::Result<Registry> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;

    let pipelines =
        parse_seed(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    let count = pipelines.len();

    let registry = Registry::from_pipelines(pipelines)
        .with_context(|| format!("invalid seed file {}", path.display()))?;

    info!(pipelines = count, "Registry seeded from {}", path.display());
    Ok(registry)
}
