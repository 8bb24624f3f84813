//! Snapshot API Handlers
//!
//! Read-only views of the registry. Nothing here mutates state.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use keel_core::domain::pipeline::Pipeline;

use crate::api::error::ApiResult;
use crate::repository::Registry;

/// GET /pipelines
/// Every pipeline with its stages and current statuses, sorted by id
pub async fn list_pipelines(State(registry): State<Arc<Registry>>) -> Json<Vec<Pipeline>> {
    tracing::debug!("Listing all pipelines");
    Json(registry.list())
}

/// GET /pipelines/{id}
pub async fn get_pipeline(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);
    Ok(Json(registry.lookup(&id)?))
}
