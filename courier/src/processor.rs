//! One full delivery attempt: claim, send, classify, persist, transition.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use thiserror::Error;

use crate::backoff;
use crate::dispatch::Dispatcher;
use crate::error::{CourierError, Result};
use crate::queue::{AttemptRecord, MAX_RETRIES, QueueRowPatch, QueueStatus};
use crate::store::QueueStore;

/// What a single tick of work amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// No eligible row at this tier.
    Idle,
    /// Attempt succeeded; the row is COMPLETED.
    Completed,
    /// Attempt failed with retries remaining; the row is PENDING at the next
    /// tier with a future eligibility time.
    Rescheduled,
    /// Attempt failed at the final tier; the row is FAILED.
    Exhausted,
}

/// Processing failure carrying the claimed row (if any) so the worker can
/// release it back to PENDING.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ProcessError {
    pub row_id: Option<i64>,
    #[source]
    pub source: CourierError,
}

/// Runs attempts against a store and a dispatcher. One processor is shared
/// by every worker in a pool.
pub struct AttemptProcessor<S, D> {
    store: Arc<S>,
    dispatcher: Arc<D>,
}

impl<S: QueueStore, D: Dispatcher> AttemptProcessor<S, D> {
    pub fn new(store: Arc<S>, dispatcher: Arc<D>) -> Self {
        Self { store, dispatcher }
    }

    /// Claim and execute at most one attempt at the given tier.
    ///
    /// Attempt-level failures (transport errors, non-2xx responses) are not
    /// errors here; they are recorded and drive the state machine. An `Err`
    /// means the engine itself could not complete the transition, and the
    /// caller should attempt `reset_to_pending` for the reported row.
    pub async fn process_one(
        &self,
        tier: i16,
        worker_id: &str,
    ) -> std::result::Result<Processed, ProcessError> {
        let claimed = self.store.claim_next(tier).await.map_err(|source| ProcessError {
            row_id: None,
            source,
        })?;

        let Some(mut row) = claimed else {
            return Ok(Processed::Idle);
        };

        counter!("courier_claims_total").increment(1);
        tracing::debug!(
            worker_id,
            queue_id = %row.queue_id,
            tier,
            url = %row.webhook_url,
            "Claimed delivery"
        );

        // The claim filters on retry_count = tier, so a mismatch is a
        // programmer error. Leave the row in PROCESSING for operators.
        if row.retry_count != tier {
            debug_assert!(
                false,
                "claim for tier {tier} returned row at tier {}",
                row.retry_count
            );
            tracing::error!(
                worker_id,
                queue_id = %row.queue_id,
                expected_tier = tier,
                actual_tier = row.retry_count,
                "Claim returned row at wrong tier; leaving in PROCESSING"
            );
            return Ok(Processed::Idle);
        }

        let started_at = Utc::now();
        let outcome = self.dispatcher.send(&row).await;
        let completed_at = Utc::now();
        let duration_ms = outcome.duration.as_millis() as i64;
        let success = outcome.is_success();

        let error_msg = if let Some(transport) = outcome.transport_error.as_ref() {
            transport.clone()
        } else if !success {
            let code = outcome.http_status.unwrap_or_default();
            match reqwest::StatusCode::from_u16(code)
                .ok()
                .and_then(|s| s.canonical_reason())
            {
                Some(reason) => format!("HTTP {code}: {reason}"),
                None => format!("HTTP {code}"),
            }
        } else {
            String::new()
        };

        let attempt = AttemptRecord {
            tier: row.retry_count,
            started_at,
            completed_at: Some(completed_at),
            duration_ms,
            http_status: outcome.http_status.map(i32::from),
            response_body: outcome.body,
            error: error_msg.clone(),
        };

        // History loss is tolerated; blocking the state transition is not.
        if let Err(e) = self.store.record_attempt(row.id, &attempt).await {
            tracing::warn!(
                worker_id,
                queue_id = %row.queue_id,
                error = %e,
                "Failed to record attempt history, continuing"
            );
        }

        if let Some(code) = outcome.http_status {
            row.last_http_status = Some(i32::from(code));
        }
        if !error_msg.is_empty() {
            row.last_error = Some(error_msg.clone());
        }

        if success {
            self.store
                .mark_completed(row.id, started_at)
                .await
                .map_err(|source| ProcessError {
                    row_id: Some(row.id),
                    source,
                })?;

            counter!("courier_attempts_total", "outcome" => "completed").increment(1);
            tracing::info!(
                worker_id,
                queue_id = %row.queue_id,
                tier,
                status = ?outcome.http_status,
                duration_ms,
                "Delivery completed"
            );
            Ok(Processed::Completed)
        } else if row.retry_count < MAX_RETRIES {
            let delay = backoff::backoff_delay(row.retry_count);
            let next_retry_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::minutes(1));

            row.retry_count += 1;
            row.next_retry_at = next_retry_at;
            row.status = QueueStatus::Pending;
            row.updated_at = Utc::now();

            let patch = QueueRowPatch {
                status: Some(QueueStatus::Pending),
                retry_count: Some(row.retry_count),
                next_retry_at: Some(next_retry_at),
                last_http_status: row.last_http_status,
                last_error: row.last_error.clone(),
            };
            self.store
                .reschedule(row.id, &patch)
                .await
                .map_err(|source| ProcessError {
                    row_id: Some(row.id),
                    source,
                })?;

            counter!("courier_attempts_total", "outcome" => "rescheduled").increment(1);
            tracing::warn!(
                worker_id,
                queue_id = %row.queue_id,
                tier,
                next_tier = row.retry_count,
                next_retry_at = %next_retry_at,
                error = %error_msg,
                "Delivery attempt failed, rescheduled"
            );
            Ok(Processed::Rescheduled)
        } else {
            let reason = outcome
                .transport_error
                .unwrap_or_else(|| format!("HTTP {}", outcome.http_status.unwrap_or_default()));
            self.store
                .mark_failed(row.id, &format!("max retries exceeded: {reason}"))
                .await
                .map_err(|source| ProcessError {
                    row_id: Some(row.id),
                    source,
                })?;

            counter!("courier_attempts_total", "outcome" => "exhausted").increment(1);
            tracing::error!(
                worker_id,
                queue_id = %row.queue_id,
                tier,
                reason = %reason,
                "Delivery failed permanently"
            );
            Ok(Processed::Exhausted)
        }
    }

    /// Best-effort release of a row stuck in PROCESSING after a processing
    /// error.
    pub async fn reset_to_pending(&self, id: i64) -> Result<()> {
        self.store.reset_to_pending(id).await
    }
}
