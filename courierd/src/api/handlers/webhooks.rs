//! Intake handlers: accept deliveries and expose their status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use metrics::counter;
use tracing::instrument;
use uuid::Uuid;

use courier::{EventType, NewQueueRow, QueueStore};

use crate::AppState;
use crate::api::models::webhooks::{
    WebhookEnqueueRequest, WebhookEnqueueResponse, WebhookStatusResponse,
};
use crate::errors::{Error, Result};

/// Accept a webhook-send request.
///
/// Resolves the config, denormalizes its URL onto the queue row, and inserts
/// exactly one PENDING tier-0 row eligible immediately. The response
/// acknowledges acceptance, not delivery.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "webhooks",
    request_body = WebhookEnqueueRequest,
    responses(
        (status = 201, description = "Delivery queued", body = WebhookEnqueueResponse),
        (status = 400, description = "Invalid event type or inactive config"),
        (status = 404, description = "Config not found"),
        (status = 500, description = "Internal server error"),
    ),
)]
#[instrument(skip_all, fields(config_id = request.config_id))]
pub async fn enqueue_webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookEnqueueRequest>,
) -> Result<(StatusCode, Json<WebhookEnqueueResponse>)> {
    let event_type = request.event_type.parse::<EventType>().map_err(|_| Error::BadRequest {
        message: format!(
            "Invalid event type: {}. Valid types are: CREDIT, DEBIT",
            request.event_type
        ),
    })?;

    if request.event_id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "event_id must not be empty".to_string(),
        });
    }

    let config = state
        .configs
        .get(request.config_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Webhook config".to_string(),
            id: request.config_id.to_string(),
        })?;

    if !config.active {
        return Err(Error::BadRequest {
            message: format!("Webhook config {} is not active", config.id),
        });
    }

    let row = state
        .queue
        .insert(NewQueueRow {
            event_type,
            event_id: request.event_id,
            config_id: config.id,
            webhook_url: config.url,
        })
        .await?;

    counter!("courierd_webhooks_accepted_total").increment(1);
    tracing::info!(queue_id = %row.queue_id, event_type = %row.event_type, "Webhook queued");

    Ok((
        StatusCode::CREATED,
        Json(WebhookEnqueueResponse {
            success: true,
            message: "webhook queued for delivery".to_string(),
            queue_id: row.queue_id,
            created_at: row.created_at,
        }),
    ))
}

/// Fetch a delivery row and its attempt history.
#[utoipa::path(
    get,
    path = "/webhooks/{queue_id}",
    tag = "webhooks",
    params(("queue_id" = Uuid, Path, description = "External queue id")),
    responses(
        (status = 200, description = "Delivery status", body = WebhookStatusResponse),
        (status = 404, description = "Delivery not found"),
        (status = 500, description = "Internal server error"),
    ),
)]
#[instrument(skip_all, fields(queue_id = %queue_id))]
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<WebhookStatusResponse>> {
    let row = state.queue.get(queue_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Webhook delivery".to_string(),
        id: queue_id.to_string(),
    })?;

    let attempts = state.queue.attempts(row.id).await?;

    Ok(Json(WebhookStatusResponse::from_row(row, attempts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_server;
    use courier::NewWebhookConfig;
    use serde_json::json;
    use sqlx::PgPool;

    async fn create_config(state: &AppState, active: bool) -> i64 {
        state
            .configs
            .insert(&NewWebhookConfig {
                name: "payments".to_string(),
                event_type: EventType::Credit,
                url: "https://example.com/hook".to_string(),
                active,
                timeout_secs: 30,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn enqueue_inserts_pending_row(pool: PgPool) {
        let (state, server) = test_server(pool);
        let config_id = create_config(&state, true).await;

        let response = server
            .post("/webhooks")
            .json(&json!({
                "event_type": "CREDIT",
                "event_id": "e1",
                "config_id": config_id,
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: WebhookEnqueueResponse = response.json();
        assert!(body.success);

        let row = state.queue.get(body.queue_id).await.unwrap().unwrap();
        assert_eq!(row.status.as_str(), "PENDING");
        assert_eq!(row.retry_count, 0);
        assert_eq!(row.webhook_url, "https://example.com/hook");
        assert_eq!(row.event_id, "e1");
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn enqueue_rejects_invalid_event_type(pool: PgPool) {
        let (state, server) = test_server(pool);
        let config_id = create_config(&state, true).await;

        let response = server
            .post("/webhooks")
            .json(&json!({
                "event_type": "REFUND",
                "event_id": "e1",
                "config_id": config_id,
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn enqueue_rejects_unknown_config(pool: PgPool) {
        let (_state, server) = test_server(pool);

        let response = server
            .post("/webhooks")
            .json(&json!({
                "event_type": "DEBIT",
                "event_id": "e1",
                "config_id": 999,
            }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn enqueue_rejects_inactive_config(pool: PgPool) {
        let (state, server) = test_server(pool);
        let config_id = create_config(&state, false).await;

        let response = server
            .post("/webhooks")
            .json(&json!({
                "event_type": "CREDIT",
                "event_id": "e1",
                "config_id": config_id,
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn status_endpoint_returns_row_and_history(pool: PgPool) {
        let (state, server) = test_server(pool);
        let config_id = create_config(&state, true).await;

        let enqueue: WebhookEnqueueResponse = server
            .post("/webhooks")
            .json(&json!({
                "event_type": "CREDIT",
                "event_id": "e1",
                "config_id": config_id,
            }))
            .await
            .json();

        let response = server.get(&format!("/webhooks/{}", enqueue.queue_id)).await;
        response.assert_status_ok();
        let status: WebhookStatusResponse = response.json();
        assert_eq!(status.queue_id, enqueue.queue_id);
        assert_eq!(status.status, "PENDING");
        assert!(status.attempts.is_empty());

        let missing = server.get(&format!("/webhooks/{}", Uuid::new_v4())).await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn health_is_alive(pool: PgPool) {
        let (_state, server) = test_server(pool);
        server.get("/health").await.assert_status_ok();
    }
}
