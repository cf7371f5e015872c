//! PostgreSQL implementation of [`QueueStore`].
//!
//! The claim is a single auto-committed statement: an `UPDATE` whose target
//! row is selected with `FOR UPDATE SKIP LOCKED`, so concurrent claimants
//! never block each other and never receive the same row. All other
//! mutations are single-row updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::QueueStore;
use crate::error::Result;
use crate::queue::{AttemptRecord, AttemptRow, NewQueueRow, QueueRow, QueueRowPatch};

/// PostgreSQL-backed queue store shared by all workers in a process.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    #[instrument(skip(self, row), fields(event_id = %row.event_id, config_id = row.config_id), err)]
    async fn insert(&self, row: NewQueueRow) -> Result<QueueRow> {
        let inserted = sqlx::query_as::<_, QueueRow>(
            r#"
            INSERT INTO webhook_queue
                (queue_id, event_type, event_id, config_id, webhook_url, status, retry_count, next_retry_at)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', 0, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.event_type)
        .bind(&row.event_id)
        .bind(row.config_id)
        .bind(&row.webhook_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self, tier: i16) -> Result<Option<QueueRow>> {
        let claimed = sqlx::query_as::<_, QueueRow>(
            r#"
            UPDATE webhook_queue
            SET status = 'PROCESSING', updated_at = now()
            WHERE id IN (
                SELECT id FROM webhook_queue
                WHERE status = 'PENDING'
                  AND retry_count = $1
                  AND next_retry_at <= now()
                  AND deleted_at IS NULL
                ORDER BY next_retry_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed)
    }

    #[instrument(skip(self, attempt), fields(tier = attempt.tier), err)]
    async fn record_attempt(&self, id: i64, attempt: &AttemptRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO webhook_attempts
                (row_id, tier, started_at, completed_at, duration_ms, http_status, response_body, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (row_id, tier) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(attempt.tier)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.duration_ms)
        .bind(attempt.http_status)
        .bind(&attempt.response_body)
        .bind(&attempt.error)
        .execute(&mut *tx)
        .await?;

        // An empty attempt error leaves last_error untouched, so a late
        // success keeps the prior failure's message on the row.
        let error_msg = (!attempt.error.is_empty()).then_some(attempt.error.as_str());

        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET last_http_status = COALESCE($2, last_http_status),
                last_error = COALESCE($3, last_error),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt.http_status)
        .bind(error_msg)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn mark_completed(&self, id: i64, processing_started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'COMPLETED',
                completed_at = COALESCE(completed_at, now()),
                processing_started_at = $2,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(processing_started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, error_msg), err)]
    async fn mark_failed(&self, id: i64, error_msg: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'FAILED',
                last_error = $2,
                completed_at = COALESCE(completed_at, now()),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_msg)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, patch), err)]
    async fn reschedule(&self, id: i64, patch: &QueueRowPatch) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = COALESCE($2, status),
                retry_count = COALESCE($3, retry_count),
                next_retry_at = COALESCE($4, next_retry_at),
                last_http_status = COALESCE($5, last_http_status),
                last_error = COALESCE($6, last_error),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.status)
        .bind(patch.retry_count)
        .bind(patch.next_retry_at)
        .bind(patch.last_http_status)
        .bind(patch.last_error.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn reset_to_pending(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'PENDING', updated_at = now()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get(&self, queue_id: Uuid) -> Result<Option<QueueRow>> {
        let row = sqlx::query_as::<_, QueueRow>(
            "SELECT * FROM webhook_queue WHERE queue_id = $1 AND deleted_at IS NULL",
        )
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn attempts(&self, id: i64) -> Result<Vec<AttemptRow>> {
        let attempts = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM webhook_attempts WHERE row_id = $1 ORDER BY tier ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    #[instrument(skip(self), err)]
    async fn release_stuck(&self, older_than: std::time::Duration) -> Result<u64> {
        let released = sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'PENDING', updated_at = now()
            WHERE status = 'PROCESSING'
              AND updated_at < now() - make_interval(secs => $1::double precision)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if released > 0 {
            tracing::warn!(released, "Released rows stuck in PROCESSING");
        }

        Ok(released)
    }
}
