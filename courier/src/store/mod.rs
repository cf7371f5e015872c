//! Persistence layer for the delivery queue.
//!
//! The [`QueueStore`] trait is the engine's only view of storage. The
//! PostgreSQL implementation carries the production claim semantics
//! (`FOR UPDATE SKIP LOCKED`); the in-memory implementation exists for
//! engine tests that do not need a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::queue::{AttemptRecord, AttemptRow, NewQueueRow, QueueRow, QueueRowPatch};

pub mod configs;
pub mod memory;
pub mod postgres;

/// Storage operations for delivery rows and attempt history.
///
/// Implementations must make `claim_next` atomic: a row returned from it has
/// been transitioned to PROCESSING under a lock no concurrent claimant can
/// also hold, so no delivery is ever executed by two workers at once.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new row: assigns internal id and external `queue_id`,
    /// status PENDING, retry count 0, eligible immediately.
    async fn insert(&self, row: NewQueueRow) -> Result<QueueRow>;

    /// Atomically claim the oldest-eligible PENDING row at the given tier,
    /// flipping it to PROCESSING. Returns `None` when nothing is eligible.
    /// Rows locked by concurrent claimants are skipped, never waited on.
    async fn claim_next(&self, tier: i16) -> Result<Option<QueueRow>>;

    /// Write the tier's history slot (write-once; a duplicate write is a
    /// no-op) and mirror the summary fields onto the parent row.
    ///
    /// `last_http_status` is mirrored only when the attempt produced a
    /// response; `last_error` only when the attempt error is non-empty. A
    /// row that succeeds after failures therefore still carries the prior
    /// failure's `last_error` as an audit trail.
    async fn record_attempt(&self, id: i64, attempt: &AttemptRecord) -> Result<()>;

    /// Transition to COMPLETED, stamping `completed_at` and the
    /// caller-observed `processing_started_at`.
    async fn mark_completed(&self, id: i64, processing_started_at: DateTime<Utc>) -> Result<()>;

    /// Transition to FAILED with a terminal error message.
    async fn mark_failed(&self, id: i64, error_msg: &str) -> Result<()>;

    /// Merge-update the row: `None` patch fields leave persisted values
    /// unchanged. Used after a failed attempt to bump the retry count, set
    /// the future `next_retry_at`, and restore PENDING.
    async fn reschedule(&self, id: i64, patch: &QueueRowPatch) -> Result<()>;

    /// Release a row stuck in PROCESSING after a processor-level error so
    /// another claim can retake it. A no-op for rows not in PROCESSING.
    async fn reset_to_pending(&self, id: i64) -> Result<()>;

    /// Look up a row by its external `queue_id`.
    async fn get(&self, queue_id: Uuid) -> Result<Option<QueueRow>>;

    /// Attempt history for a row, ordered by tier.
    async fn attempts(&self, id: i64) -> Result<Vec<AttemptRow>>;

    /// Move PROCESSING rows whose `updated_at` is older than the threshold
    /// back to PENDING. Returns the number of rows released. Crash recovery
    /// only; the threshold is operator-supplied configuration.
    async fn release_stuck(&self, older_than: std::time::Duration) -> Result<u64>;
}
