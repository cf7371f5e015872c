use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use courier::{AttemptRow, QueueRow};

/// Request to enqueue a webhook delivery.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEnqueueRequest {
    /// Event class: CREDIT or DEBIT
    pub event_type: String,
    /// Caller-supplied correlation id, opaque to the engine
    pub event_id: String,
    /// Webhook config resolved at intake; its URL is denormalized onto the row
    pub config_id: i64,
}

/// Acknowledgement of an accepted delivery. Acceptance, not delivery: the
/// outcome is observable via `GET /webhooks/{queue_id}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookEnqueueResponse {
    pub success: bool,
    pub message: String,
    pub queue_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One recorded delivery attempt.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttemptResponse {
    pub tier: i16,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub http_status: Option<i32>,
    pub response_body: String,
    pub error: String,
}

impl From<AttemptRow> for AttemptResponse {
    fn from(attempt: AttemptRow) -> Self {
        Self {
            tier: attempt.tier,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            duration_ms: attempt.duration_ms,
            http_status: attempt.http_status,
            response_body: attempt.response_body,
            error: attempt.error,
        }
    }
}

/// Delivery row status with its full attempt history.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookStatusResponse {
    pub queue_id: Uuid,
    pub event_type: String,
    pub event_id: String,
    pub config_id: i64,
    pub webhook_url: String,
    pub status: String,
    pub retry_count: i16,
    pub next_retry_at: DateTime<Utc>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: Vec<AttemptResponse>,
}

impl WebhookStatusResponse {
    pub fn from_row(row: QueueRow, attempts: Vec<AttemptRow>) -> Self {
        Self {
            queue_id: row.queue_id,
            event_type: row.event_type.to_string(),
            event_id: row.event_id,
            config_id: row.config_id,
            webhook_url: row.webhook_url,
            status: row.status.to_string(),
            retry_count: row.retry_count,
            next_retry_at: row.next_retry_at,
            last_http_status: row.last_http_status,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            processing_started_at: row.processing_started_at,
            completed_at: row.completed_at,
            attempts: attempts.into_iter().map(Into::into).collect(),
        }
    }
}
