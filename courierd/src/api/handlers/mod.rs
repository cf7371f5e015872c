//! Axum route handlers for the intake API.

use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};

use crate::AppState;

pub mod configs;
pub mod webhooks;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is alive")),
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Prometheus text exposition of engine and intake metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses((status = 200, description = "Prometheus metrics", body = String, content_type = "text/plain")),
)]
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
