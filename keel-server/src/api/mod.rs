//! API Module
//!
//! HTTP surface of the server: the WebSocket control endpoint and the
//! read-only snapshot endpoints. They are normally served on separate
//! listeners; [`combined_router`] serves both from one.

pub mod control;
pub mod error;
pub mod health;
pub mod pipeline;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::repository::Registry;

pub use control::ControlState;

fn control_routes(state: ControlState) -> Router {
    Router::new()
        .route("/ws", get(control::control_socket))
        .with_state(state)
}

fn snapshot_routes(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/pipelines", get(pipeline::list_pipelines))
        .route("/pipelines/{id}", get(pipeline::get_pipeline))
        .with_state(registry)
}

/// Router for the control listener
pub fn control_router(state: ControlState) -> Router {
    control_routes(state)
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
}

/// Router for the snapshot listener
pub fn snapshot_router(registry: Arc<Registry>) -> Router {
    snapshot_routes(registry)
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
}

/// Control and snapshot endpoints on one listener
pub fn combined_router(state: ControlState, registry: Arc<Registry>) -> Router {
    control_routes(state)
        .merge(snapshot_routes(registry))
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
}
