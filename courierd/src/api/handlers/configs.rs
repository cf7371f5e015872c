//! Webhook config administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::instrument;

use courier::{EventType, NewWebhookConfig};

use crate::AppState;
use crate::api::models::configs::{ConfigCreate, ConfigResponse};
use crate::errors::{Error, Result};

/// Create a webhook config.
#[utoipa::path(
    post,
    path = "/configs",
    tag = "configs",
    request_body = ConfigCreate,
    responses(
        (status = 201, description = "Config created", body = ConfigResponse),
        (status = 400, description = "Invalid config"),
        (status = 500, description = "Internal server error"),
    ),
)]
#[instrument(skip_all)]
pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<ConfigCreate>,
) -> Result<(StatusCode, Json<ConfigResponse>)> {
    let event_type = request.event_type.parse::<EventType>().map_err(|_| Error::BadRequest {
        message: format!(
            "Invalid event type: {}. Valid types are: CREDIT, DEBIT",
            request.event_type
        ),
    })?;

    if request.name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "name must not be empty".to_string(),
        });
    }
    if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
        return Err(Error::BadRequest {
            message: "url must be an http(s) URL".to_string(),
        });
    }
    if request.timeout_secs <= 0 {
        return Err(Error::BadRequest {
            message: "timeout_secs must be greater than zero".to_string(),
        });
    }

    let config = state
        .configs
        .insert(&NewWebhookConfig {
            name: request.name,
            event_type,
            url: request.url,
            active: request.active,
            timeout_secs: request.timeout_secs,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(config.into())))
}

/// List all webhook configs.
#[utoipa::path(
    get,
    path = "/configs",
    tag = "configs",
    responses(
        (status = 200, description = "All configs", body = [ConfigResponse]),
        (status = 500, description = "Internal server error"),
    ),
)]
#[instrument(skip_all)]
pub async fn list_configs(State(state): State<AppState>) -> Result<Json<Vec<ConfigResponse>>> {
    let configs = state.configs.list().await?;
    Ok(Json(configs.into_iter().map(Into::into).collect()))
}

/// Fetch one webhook config.
#[utoipa::path(
    get,
    path = "/configs/{id}",
    tag = "configs",
    params(("id" = i64, Path, description = "Config id")),
    responses(
        (status = 200, description = "Config", body = ConfigResponse),
        (status = 404, description = "Config not found"),
        (status = 500, description = "Internal server error"),
    ),
)]
#[instrument(skip_all, fields(config_id = id))]
pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConfigResponse>> {
    let config = state.configs.get(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Webhook config".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(config.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_server;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn create_list_get_round_trip(pool: PgPool) {
        let (_state, server) = test_server(pool);

        let created = server
            .post("/configs")
            .json(&json!({
                "name": "payments",
                "event_type": "CREDIT",
                "url": "https://example.com/hook",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let config: ConfigResponse = created.json();
        assert!(config.active);
        assert_eq!(config.timeout_secs, 30);

        let listed: Vec<ConfigResponse> = server.get("/configs").await.json();
        assert_eq!(listed.len(), 1);

        let fetched = server.get(&format!("/configs/{}", config.id)).await;
        fetched.assert_status_ok();

        let missing = server.get("/configs/999").await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrator = "courier::MIGRATOR")]
    async fn create_rejects_bad_input(pool: PgPool) {
        let (_state, server) = test_server(pool);

        let bad_event = server
            .post("/configs")
            .json(&json!({
                "name": "payments",
                "event_type": "refund",
                "url": "https://example.com/hook",
            }))
            .await;
        bad_event.assert_status(StatusCode::BAD_REQUEST);

        let bad_url = server
            .post("/configs")
            .json(&json!({
                "name": "payments",
                "event_type": "DEBIT",
                "url": "ftp://example.com/hook",
            }))
            .await;
        bad_url.assert_status(StatusCode::BAD_REQUEST);
    }
}
