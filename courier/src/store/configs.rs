//! Webhook config persistence. The engine reads configs only through the
//! intake path (URL denormalization at insert); administration happens over
//! the HTTP API.

use sqlx::PgPool;
use tracing::instrument;

use crate::error::Result;
use crate::queue::{NewWebhookConfig, WebhookConfig};

/// Repository for webhook endpoint configurations.
#[derive(Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, config), fields(name = %config.name), err)]
    pub async fn insert(&self, config: &NewWebhookConfig) -> Result<WebhookConfig> {
        let inserted = sqlx::query_as::<_, WebhookConfig>(
            r#"
            INSERT INTO webhook_configs (name, event_type, url, active, timeout_secs)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&config.name)
        .bind(config.event_type)
        .bind(&config.url)
        .bind(config.active)
        .bind(config.timeout_secs)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: i64) -> Result<Option<WebhookConfig>> {
        let config =
            sqlx::query_as::<_, WebhookConfig>("SELECT * FROM webhook_configs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(config)
    }

    #[instrument(skip(self), err)]
    pub async fn list(&self) -> Result<Vec<WebhookConfig>> {
        let configs =
            sqlx::query_as::<_, WebhookConfig>("SELECT * FROM webhook_configs ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(configs)
    }

    #[instrument(skip(self), err)]
    pub async fn set_active(&self, id: i64, active: bool) -> Result<Option<WebhookConfig>> {
        let config = sqlx::query_as::<_, WebhookConfig>(
            r#"
            UPDATE webhook_configs
            SET active = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(config)
    }
}
