//! Tier-dedicated retry worker.
//!
//! A worker owns a period timer and claims at most one row per tick, so the
//! pool's database fan-out is capped by the roster size. Worker identity is
//! a log-only label; claim exclusivity comes from the store's row locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::processor::{AttemptProcessor, Processed};
use crate::store::QueueStore;

pub struct RetryWorker<S, D> {
    tier: i16,
    poll_interval: Duration,
    worker_id: String,
    processor: Arc<AttemptProcessor<S, D>>,
}

impl<S: QueueStore, D: Dispatcher> RetryWorker<S, D> {
    pub fn new(tier: i16, poll_interval: Duration, processor: Arc<AttemptProcessor<S, D>>) -> Self {
        Self {
            tier,
            poll_interval,
            worker_id: format!("retry-{tier}-{:08x}", rand::random::<u32>()),
            processor,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until cancelled. An in-flight attempt always finishes before the
    /// worker exits, so a claimed row is either transitioned per its outcome
    /// or released by the recovery path below.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            tier = self.tier,
            poll_interval = ?self.poll_interval,
            "Worker starting"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.processor.process_one(self.tier, &self.worker_id).await {
                        Ok(Processed::Idle) => {
                            tracing::trace!(worker_id = %self.worker_id, "No eligible rows");
                        }
                        Ok(outcome) => {
                            tracing::debug!(worker_id = %self.worker_id, ?outcome, "Tick processed a row");
                        }
                        Err(e) => {
                            tracing::warn!(
                                worker_id = %self.worker_id,
                                error = %e,
                                row_id = ?e.row_id,
                                "Processing failed"
                            );
                            if let Some(row_id) = e.row_id {
                                if let Err(reset_err) = self.processor.reset_to_pending(row_id).await {
                                    tracing::error!(
                                        worker_id = %self.worker_id,
                                        row_id,
                                        error = %reset_err,
                                        "Failed to release claimed row; it will stay in PROCESSING"
                                    );
                                }
                            }
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.worker_id, tier = self.tier, "Worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{MockDispatcher, MockOutcome};
    use crate::queue::{EventType, NewQueueRow, QueueStatus};
    use crate::store::memory::MemoryQueueStore;

    fn setup() -> (Arc<MemoryQueueStore>, Arc<MockDispatcher>, Arc<AttemptProcessor<MemoryQueueStore, MockDispatcher>>) {
        let store = Arc::new(MemoryQueueStore::new());
        let dispatcher = Arc::new(MockDispatcher::new());
        let processor = Arc::new(AttemptProcessor::new(store.clone(), dispatcher.clone()));
        (store, dispatcher, processor)
    }

    async fn insert(store: &MemoryQueueStore) -> i64 {
        store
            .insert(NewQueueRow {
                event_type: EventType::Credit,
                event_id: "e1".to_string(),
                config_id: 1,
                webhook_url: "https://example.com/hook".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn worker_id_has_expected_shape() {
        let (_, _, processor) = setup();
        let worker = RetryWorker::new(3, Duration::from_secs(1), processor);
        let id = worker.worker_id();
        assert!(id.starts_with("retry-3-"));
        let suffix = id.strip_prefix("retry-3-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn worker_delivers_eligible_row() {
        let (store, _dispatcher, processor) = setup();
        let id = insert(&store).await;

        let shutdown = CancellationToken::new();
        let worker = RetryWorker::new(0, Duration::from_millis(20), processor);
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(store.row(id).unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_attempt() {
        let (store, dispatcher, processor) = setup();
        dispatcher.push(MockOutcome::status(200, "ok").with_delay(Duration::from_millis(200)));
        let id = insert(&store).await;

        let shutdown = CancellationToken::new();
        let worker = RetryWorker::new(0, Duration::from_millis(10), processor);
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        // Cancel while the slow attempt is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should exit promptly after the attempt finishes")
            .unwrap();

        // The claimed row finished its transition before exit.
        assert_eq!(store.row(id).unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn processing_error_releases_claimed_row() {
        let (store, _dispatcher, processor) = setup();
        store.fail_terminal_writes(true);
        let id = insert(&store).await;

        let shutdown = CancellationToken::new();
        let worker = RetryWorker::new(0, Duration::from_millis(20), processor);
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Terminal writes always failed, so the recovery path must have
        // released the claim rather than leaving the row stuck.
        assert_eq!(store.row(id).unwrap().status, QueueStatus::Pending);
    }
}
