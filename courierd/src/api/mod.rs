//! HTTP API layer: route handlers and request/response models.

use axum::Router;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::AppState;

pub mod handlers;
pub mod models;

/// Build the intake router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/webhooks", post(handlers::webhooks::enqueue_webhook))
        .route("/webhooks/{queue_id}", get(handlers::webhooks::get_webhook))
        .route(
            "/configs",
            post(handlers::configs::create_config).get(handlers::configs::list_configs),
        )
        .route("/configs/{id}", get(handlers::configs::get_config))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state);

    api.merge(Scalar::with_url("/docs", crate::openapi::ApiDoc::openapi()))
}
