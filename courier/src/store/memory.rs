//! In-memory [`QueueStore`] used by engine tests.
//!
//! Claims are serialized by the interior mutex, which gives the same
//! at-most-one-claimant guarantee the PostgreSQL row lock provides. Failure
//! injection flags let tests drive the recovery paths (swallowed history
//! writes, reset-to-pending after a terminal-write error).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::QueueStore;
use crate::error::{CourierError, Result};
use crate::queue::{AttemptRecord, AttemptRow, NewQueueRow, QueueRow, QueueRowPatch, QueueStatus};

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, QueueRow>,
    attempts: BTreeMap<(i64, i16), AttemptRow>,
    next_row_id: i64,
    next_attempt_id: i64,
}

#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
    fail_terminal_writes: AtomicBool,
    fail_record_attempt: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make mark_completed / mark_failed / reschedule return errors.
    pub fn fail_terminal_writes(&self, fail: bool) {
        self.fail_terminal_writes.store(fail, Ordering::SeqCst);
    }

    /// Make record_attempt return errors.
    pub fn fail_record_attempt(&self, fail: bool) {
        self.fail_record_attempt.store(fail, Ordering::SeqCst);
    }

    /// Snapshot a row by internal id.
    pub fn row(&self, id: i64) -> Option<QueueRow> {
        self.inner.lock().rows.get(&id).cloned()
    }

    /// Snapshot all rows.
    pub fn rows(&self) -> Vec<QueueRow> {
        self.inner.lock().rows.values().cloned().collect()
    }

    /// Force a row's eligibility time, simulating time passing.
    pub fn set_next_retry_at(&self, id: i64, at: DateTime<Utc>) {
        if let Some(row) = self.inner.lock().rows.get_mut(&id) {
            row.next_retry_at = at;
        }
    }

    /// Backdate a row's updated_at, for sweeper tests.
    pub fn set_updated_at(&self, id: i64, at: DateTime<Utc>) {
        if let Some(row) = self.inner.lock().rows.get_mut(&id) {
            row.updated_at = at;
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, row: NewQueueRow) -> Result<QueueRow> {
        let mut inner = self.inner.lock();
        inner.next_row_id += 1;
        let id = inner.next_row_id;
        let now = Utc::now();

        let row = QueueRow {
            id,
            queue_id: Uuid::new_v4(),
            event_type: row.event_type,
            event_id: row.event_id,
            config_id: row.config_id,
            webhook_url: row.webhook_url,
            status: QueueStatus::Pending,
            retry_count: 0,
            next_retry_at: now,
            last_http_status: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
            deleted_at: None,
        };
        inner.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn claim_next(&self, tier: i16) -> Result<Option<QueueRow>> {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let eligible = inner
            .rows
            .values()
            .filter(|r| {
                r.status == QueueStatus::Pending
                    && r.retry_count == tier
                    && r.next_retry_at <= now
                    && r.deleted_at.is_none()
            })
            .min_by_key(|r| r.next_retry_at)
            .map(|r| r.id);

        let Some(id) = eligible else {
            return Ok(None);
        };

        let row = inner.rows.get_mut(&id).expect("row exists");
        row.status = QueueStatus::Processing;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn record_attempt(&self, id: i64, attempt: &AttemptRecord) -> Result<()> {
        if self.fail_record_attempt.load(Ordering::SeqCst) {
            return Err(CourierError::Other(anyhow!("injected record failure")));
        }

        let mut inner = self.inner.lock();
        inner.next_attempt_id += 1;
        let attempt_id = inner.next_attempt_id;

        // Tier slots are write-once.
        inner
            .attempts
            .entry((id, attempt.tier))
            .or_insert_with(|| AttemptRow {
                id: attempt_id,
                row_id: id,
                tier: attempt.tier,
                started_at: attempt.started_at,
                completed_at: attempt.completed_at,
                duration_ms: attempt.duration_ms,
                http_status: attempt.http_status,
                response_body: attempt.response_body.clone(),
                error: attempt.error.clone(),
                created_at: Utc::now(),
            });

        if let Some(row) = inner.rows.get_mut(&id) {
            if let Some(status) = attempt.http_status {
                row.last_http_status = Some(status);
            }
            if !attempt.error.is_empty() {
                row.last_error = Some(attempt.error.clone());
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_completed(&self, id: i64, processing_started_at: DateTime<Utc>) -> Result<()> {
        if self.fail_terminal_writes.load(Ordering::SeqCst) {
            return Err(CourierError::Other(anyhow!("injected terminal failure")));
        }

        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get_mut(&id) {
            row.status = QueueStatus::Completed;
            row.completed_at.get_or_insert_with(Utc::now);
            row.processing_started_at = Some(processing_started_at);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error_msg: &str) -> Result<()> {
        if self.fail_terminal_writes.load(Ordering::SeqCst) {
            return Err(CourierError::Other(anyhow!("injected terminal failure")));
        }

        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get_mut(&id) {
            row.status = QueueStatus::Failed;
            row.last_error = Some(error_msg.to_string());
            row.completed_at.get_or_insert_with(Utc::now);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reschedule(&self, id: i64, patch: &QueueRowPatch) -> Result<()> {
        if self.fail_terminal_writes.load(Ordering::SeqCst) {
            return Err(CourierError::Other(anyhow!("injected terminal failure")));
        }

        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get_mut(&id) {
            patch.apply(row);
        }
        Ok(())
    }

    async fn reset_to_pending(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get_mut(&id) {
            if row.status == QueueStatus::Processing {
                row.status = QueueStatus::Pending;
                row.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn get(&self, queue_id: Uuid) -> Result<Option<QueueRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .rows
            .values()
            .find(|r| r.queue_id == queue_id && r.deleted_at.is_none())
            .cloned())
    }

    async fn attempts(&self, id: i64) -> Result<Vec<AttemptRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .attempts
            .range((id, 0)..=(id, i16::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn release_stuck(&self, older_than: std::time::Duration) -> Result<u64> {
        let Ok(older_than) = chrono::Duration::from_std(older_than) else {
            return Ok(0);
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(older_than) else {
            return Ok(0);
        };
        let mut inner = self.inner.lock();
        let mut released = 0;
        for row in inner.rows.values_mut() {
            if row.status == QueueStatus::Processing && row.updated_at < cutoff {
                row.status = QueueStatus::Pending;
                row.updated_at = Utc::now();
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventType;

    fn new_row(event_id: &str) -> NewQueueRow {
        NewQueueRow {
            event_type: EventType::Debit,
            event_id: event_id.to_string(),
            config_id: 1,
            webhook_url: "https://example.com/hook".to_string(),
        }
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_tier_scoped() {
        let store = MemoryQueueStore::new();
        let row = store.insert(new_row("e1")).await.unwrap();

        assert!(store.claim_next(1).await.unwrap().is_none());
        let claimed = store.claim_next(0).await.unwrap().unwrap();
        assert_eq!(claimed.id, row.id);
        assert!(store.claim_next(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_stuck_uses_updated_at() {
        let store = MemoryQueueStore::new();
        let row = store.insert(new_row("e1")).await.unwrap();
        store.claim_next(0).await.unwrap().unwrap();

        assert_eq!(
            store
                .release_stuck(std::time::Duration::from_secs(60))
                .await
                .unwrap(),
            0
        );

        store.set_updated_at(row.id, Utc::now() - chrono::Duration::minutes(5));
        assert_eq!(
            store
                .release_stuck(std::time::Duration::from_secs(60))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.row(row.id).unwrap().status, QueueStatus::Pending);
    }
}
