//! Shared helpers for handler tests.

use std::sync::Arc;

use axum_test::TestServer;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;

use courier::{PgConfigStore, PgQueueStore};

use crate::{AppState, api};

pub fn test_state(pool: PgPool) -> AppState {
    AppState {
        queue: Arc::new(PgQueueStore::new(pool.clone())),
        configs: Arc::new(PgConfigStore::new(pool)),
        // A detached recorder: nothing is installed globally, so tests can
        // build any number of states in one process.
        metrics: PrometheusBuilder::new().build_recorder().handle(),
    }
}

pub fn test_server(pool: PgPool) -> (AppState, TestServer) {
    let state = test_state(pool);
    let server = TestServer::new(api::router(state.clone())).expect("failed to build test server");
    (state, server)
}
