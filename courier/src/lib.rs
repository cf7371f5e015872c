//! # courier: durable outbound-webhook delivery
//!
//! `courier` accepts webhook-send requests, persists each as a row in a
//! PostgreSQL queue, and delivers them to external HTTP endpoints with a
//! bounded, scheduled retry policy: one initial attempt plus up to six
//! retries, each recorded for audit.
//!
//! ## Architecture
//!
//! Delivery is driven by a pool of tier-dedicated workers. A row's retry
//! count doubles as its tier: a tier-k worker only ever claims rows whose
//! `retry_count == k`, on a poll cadence matched to that tier's backoff
//! delay. Claims use `FOR UPDATE SKIP LOCKED`, so any number of processes
//! running identical rosters cooperate correctly with no coordination
//! beyond the database row locks. Worker identity is a log label, nothing
//! more.
//!
//! One attempt runs claim → send → classify → record → transition:
//!
//! - 2xx response: the row is COMPLETED.
//! - failure below tier 6: the row returns to PENDING at the next tier,
//!   eligible after an exponential backoff with ±25% jitter.
//! - failure at tier 6: the row is FAILED with a terminal error message.
//!
//! Every attempt writes a write-once history slot (`webhook_attempts`), and
//! the row carries `last_http_status`/`last_error` summary mirrors.
//!
//! ## Components
//!
//! - [`store`]: the [`store::QueueStore`] trait, its PostgreSQL
//!   implementation, and an in-memory implementation for tests.
//! - [`dispatch`]: one outbound HTTP GET per attempt over a shared pooled
//!   client.
//! - [`processor`]: the attempt state machine.
//! - [`worker`] / [`pool`]: timer-driven workers and the roster that owns
//!   them.
//! - [`backoff`]: the tier delay schedule.

pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod store;
pub mod worker;

pub use dispatch::{Dispatcher, DispatcherConfig, HttpDispatcher};
pub use error::{CourierError, Result};
pub use pool::{RosterEntry, SweeperConfig, WorkerPool, default_roster};
pub use processor::{AttemptProcessor, Processed};
pub use queue::{
    AttemptRecord, AttemptRow, EventType, MAX_RETRIES, NewQueueRow, NewWebhookConfig, QueueRow,
    QueueRowPatch, QueueStatus, WebhookConfig,
};
pub use store::QueueStore;
pub use store::configs::PgConfigStore;
pub use store::postgres::PgQueueStore;

/// Embedded schema migrations, applied by the server on startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
