//! Queue row models and the per-delivery state machine vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tier of the final attempt. A row at this retry count either completes or
/// fails; it is never rescheduled.
pub const MAX_RETRIES: i16 = 6;

/// Event class a webhook config subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Credit,
    Debit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(Self::Credit),
            "DEBIT" => Ok(Self::Debit),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a queue row.
///
/// PENDING rows become eligible once `next_retry_at` passes; PROCESSING rows
/// are held by exactly one worker via the claim row lock; COMPLETED and
/// FAILED are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "webhook_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted delivery row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueRow {
    pub id: i64,
    /// External identity handed back to the intake caller.
    pub queue_id: Uuid,
    pub event_type: EventType,
    /// Caller-supplied correlation string, opaque to the engine.
    pub event_id: String,
    pub config_id: i64,
    /// Resolved target URL, denormalized from the config at insert.
    pub webhook_url: String,
    pub status: QueueStatus,
    pub retry_count: i16,
    pub next_retry_at: DateTime<Utc>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl QueueRow {
    /// True when this row is on its last allowed attempt.
    pub fn is_final_tier(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }
}

/// Input for inserting a new delivery row. Identity, status, and scheduling
/// fields are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewQueueRow {
    pub event_type: EventType,
    pub event_id: String,
    pub config_id: i64,
    pub webhook_url: String,
}

/// Partial update applied with merge semantics: `None` fields leave the
/// persisted value unchanged, `Some` fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct QueueRowPatch {
    pub status: Option<QueueStatus>,
    pub retry_count: Option<i16>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
}

impl QueueRowPatch {
    /// Merge this patch into an in-memory row. Mirrors the SQL COALESCE
    /// update in the PostgreSQL store.
    pub fn apply(&self, row: &mut QueueRow) {
        if let Some(status) = self.status {
            row.status = status;
        }
        if let Some(retry_count) = self.retry_count {
            row.retry_count = retry_count;
        }
        if let Some(next_retry_at) = self.next_retry_at {
            row.next_retry_at = next_retry_at;
        }
        if let Some(last_http_status) = self.last_http_status {
            row.last_http_status = Some(last_http_status);
        }
        if let Some(ref last_error) = self.last_error {
            row.last_error = Some(last_error.clone());
        }
        row.updated_at = Utc::now();
    }
}

/// Outcome of one executed attempt, written once into the tier's history slot.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub tier: i16,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub http_status: Option<i32>,
    pub response_body: String,
    /// Empty string means the attempt succeeded.
    pub error: String,
}

/// A persisted attempt history slot.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttemptRow {
    pub id: i64,
    /// Internal id of the owning queue row.
    pub row_id: i64,
    pub tier: i16,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub http_status: Option<i32>,
    pub response_body: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

/// A webhook endpoint configuration. Read-only to the engine; the intake
/// resolves `config_id` against it and denormalizes the URL onto the row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookConfig {
    pub id: i64,
    pub name: String,
    pub event_type: EventType,
    pub url: String,
    pub active: bool,
    pub timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a webhook config.
#[derive(Debug, Clone)]
pub struct NewWebhookConfig {
    pub name: String,
    pub event_type: EventType,
    pub url: String,
    pub active: bool,
    pub timeout_secs: i64,
}
