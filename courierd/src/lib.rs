//! # courierd: intake server and worker host
//!
//! `courierd` is the process around the [`courier`] delivery engine. It
//! exposes the intake HTTP API (accept a delivery, inspect its status,
//! administer webhook configs), runs the tier-dedicated worker pool, and
//! wires up configuration, logging, metrics, and graceful shutdown.
//!
//! ## Request flow
//!
//! `POST /webhooks` resolves the config, denormalizes its URL, and inserts
//! one PENDING tier-0 queue row. From there delivery is entirely the worker
//! pool's business: the intake acknowledges acceptance, and the outcome is
//! observable via `GET /webhooks/{queue_id}` or the persisted row.
//!
//! Multiple `courierd` processes may run against the same database; claim
//! contention resolves at the row-lock layer, so no inter-process
//! coordination exists or is needed.
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use courierd::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = courierd::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     courierd::telemetry::init_telemetry()?;
//!
//!     Application::new(config).await?.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use courier::{HttpDispatcher, PgConfigStore, PgQueueStore, WorkerPool, default_roster};

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

pub use config::Config;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<PgQueueStore>,
    pub configs: Arc<PgConfigStore>,
    pub metrics: PrometheusHandle,
}

/// The assembled server: database pool, router, and worker pool.
pub struct Application {
    config: Config,
    listener: tokio::net::TcpListener,
    router: Router,
    worker_pool: WorkerPool<PgQueueStore, HttpDispatcher>,
}

impl Application {
    /// Connect to the database, run migrations, and bind the listener. The
    /// worker pool is constructed here but only started by [`serve`].
    ///
    /// [`serve`]: Application::serve
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
            .connect(&config.database.url)
            .await
            .context("failed to connect to database")?;

        courier::MIGRATOR
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("Database migrations applied");

        let metrics = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install metrics recorder")?;

        let queue = Arc::new(PgQueueStore::new(pool.clone()));
        let configs = Arc::new(PgConfigStore::new(pool));
        let dispatcher = Arc::new(HttpDispatcher::new(&config.dispatcher_config())?);

        let mut worker_pool = WorkerPool::new(queue.clone(), dispatcher, default_roster());
        if let Some(sweeper) = config.sweeper_config() {
            worker_pool = worker_pool.with_sweeper(sweeper);
        }

        let state = AppState {
            queue,
            configs,
            metrics,
        };

        let router = api::router(state)
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs,
            )));

        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

        Ok(Self {
            config,
            listener,
            router,
            worker_pool,
        })
    }

    /// The bound address (useful when the configured port is 0).
    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the worker pool and serve the intake API until the shutdown
    /// future resolves, then stop the pool, waiting for in-flight attempts.
    pub async fn serve(
        mut self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.worker_pool.start().await?;

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "courierd listening"
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("server error")?;

        self.worker_pool.stop().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
