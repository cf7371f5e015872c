use thiserror::Error;

/// Errors surfaced by the delivery engine.
#[derive(Error, Debug)]
pub enum CourierError {
    /// Database operation failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A row was observed in a state the caller did not expect.
    #[error("queue row {id} is in state {actual}, expected {expected}")]
    InvalidState {
        id: i64,
        expected: &'static str,
        actual: String,
    },

    /// Worker pool lifecycle misuse (double start, stop while stopped).
    #[error("worker pool: {0}")]
    Pool(String),

    /// Catch-all for non-recoverable errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;
