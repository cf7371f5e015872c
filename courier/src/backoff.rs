//! Retry backoff schedule.
//!
//! Base delays are chosen so each tier's worker poll interval is much
//! shorter than the delay after which that tier's rows become eligible,
//! bounding wasted polls. Jitter prevents correlated re-arrival storms.

use std::time::Duration;

use rand::Rng;

/// Minimum delay after any failed attempt.
const FLOOR: Duration = Duration::from_secs(60);

/// Base delay before jitter for a given retry count (the count *before* it
/// is incremented for the reschedule).
pub fn base_delay(retry_count: i16) -> Duration {
    let minutes = match retry_count {
        0 => 1,
        1 => 5,
        2 => 10,
        3 => 30,
        4 => 60,
        5 => 120,
        _ => 240,
    };
    Duration::from_secs(minutes * 60)
}

/// Backoff with ±25% uniform jitter, clamped to at least one minute.
pub fn backoff_delay(retry_count: i16) -> Duration {
    let base = base_delay(retry_count);
    let factor = rand::rng().random_range(0.75..=1.25);
    let jittered = base.mul_f64(factor);
    jittered.max(FLOOR)
}
