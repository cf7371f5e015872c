//! Worker pool: owns the roster, starts and stops the workers.
//!
//! The pool is the only component aware of the roster; workers themselves
//! know nothing beyond their `(tier, period)`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::error::{CourierError, Result};
use crate::processor::AttemptProcessor;
use crate::queue::MAX_RETRIES;
use crate::store::QueueStore;
use crate::worker::RetryWorker;

/// One roster line: how many workers poll a tier, and how often.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub tier: i16,
    pub poll_interval: Duration,
    pub count: usize,
}

/// The supported roster. Three tier-0 workers parallelize the hot path;
/// higher tiers see sparse eligibility and need only one worker each.
pub fn default_roster() -> Vec<RosterEntry> {
    [
        (0, Duration::from_secs(5), 3),
        (1, Duration::from_secs(30), 1),
        (2, Duration::from_secs(2 * 60), 1),
        (3, Duration::from_secs(5 * 60), 1),
        (4, Duration::from_secs(15 * 60), 1),
        (5, Duration::from_secs(30 * 60), 1),
        (6, Duration::from_secs(60 * 60), 1),
    ]
    .into_iter()
    .map(|(tier, poll_interval, count)| RosterEntry {
        tier,
        poll_interval,
        count,
    })
    .collect()
}

/// Crash-recovery sweep settings. There is no default threshold; the
/// operator decides how long a PROCESSING row may sit before it is
/// considered orphaned.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub stuck_after: Duration,
    pub interval: Duration,
}

/// Fixed-roster worker pool over a shared store and dispatcher.
pub struct WorkerPool<S, D> {
    store: Arc<S>,
    dispatcher: Arc<D>,
    roster: Vec<RosterEntry>,
    sweeper: Option<SweeperConfig>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl<S: QueueStore + 'static, D: Dispatcher + 'static> WorkerPool<S, D> {
    pub fn new(store: Arc<S>, dispatcher: Arc<D>, roster: Vec<RosterEntry>) -> Self {
        Self {
            store,
            dispatcher,
            roster,
            sweeper: None,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
            running: false,
        }
    }

    /// Enable the stuck-row sweeper.
    pub fn with_sweeper(mut self, config: SweeperConfig) -> Self {
        self.sweeper = Some(config);
        self
    }

    /// Start every worker in declaration order. If an entry is invalid,
    /// workers already started are stopped before the error is returned.
    /// A second start on a running pool is an error.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(CourierError::Pool("pool is already running".to_string()));
        }

        self.shutdown = CancellationToken::new();
        let processor = Arc::new(AttemptProcessor::new(
            self.store.clone(),
            self.dispatcher.clone(),
        ));

        for entry in self.roster.clone() {
            if !(0..=MAX_RETRIES).contains(&entry.tier) || entry.count == 0 {
                let message = format!(
                    "invalid roster entry: tier {} count {}",
                    entry.tier, entry.count
                );
                self.shutdown.cancel();
                for handle in self.handles.drain(..) {
                    let _ = handle.await;
                }
                return Err(CourierError::Pool(message));
            }

            for _ in 0..entry.count {
                let worker =
                    RetryWorker::new(entry.tier, entry.poll_interval, processor.clone());
                let token = self.shutdown.clone();
                self.handles.push(tokio::spawn(worker.run(token)));
            }
        }

        if let Some(sweeper) = self.sweeper.clone() {
            let store = self.store.clone();
            let token = self.shutdown.clone();
            self.handles.push(tokio::spawn(run_sweeper(store, sweeper, token)));
        }

        self.running = true;
        tracing::info!(
            workers = self.handles.len(),
            tiers = self.roster.len(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Signal all workers to stop and wait for each to exit. Stopping a pool
    /// that is not running is an error.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(CourierError::Pool("pool is not running".to_string()));
        }

        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        self.running = false;
        tracing::info!("Worker pool stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Periodically release rows orphaned in PROCESSING by a crashed process.
async fn run_sweeper<S: QueueStore>(store: Arc<S>, config: SweeperConfig, shutdown: CancellationToken) {
    tracing::info!(
        stuck_after = ?config.stuck_after,
        interval = ?config.interval,
        "Stuck-row sweeper starting"
    );

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match store.release_stuck(config.stuck_after).await {
                    Ok(0) => {}
                    Ok(released) => {
                        tracing::warn!(released, "Sweeper released stuck PROCESSING rows");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Sweeper pass failed");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Stuck-row sweeper stopping");
                break;
            }
        }
    }
}
