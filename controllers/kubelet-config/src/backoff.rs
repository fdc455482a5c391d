//! # Fibonacci Backoff
//!
//! Progressive backoff that grows more slowly than exponential backoff.
//!
//! Two sequences are used by the controller:
//! - requeue after a transient failure: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max),
//!   tracked per pool and reset on success
//! - between conflict retries inside one reconciliation: the configured base
//!   delay following the same shape, capped at ten times the base

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Requeue backoff bounds for transient failures
pub const REQUEUE_MIN: Duration = Duration::from_secs(60);
pub const REQUEUE_MAX: Duration = Duration::from_secs(600);

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Requeue backoff state per pool
#[derive(Debug, Default)]
pub struct RequeueBackoffs {
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl RequeueBackoffs {
    /// Delay before the next attempt for `pool`
    pub fn next_delay(&self, pool: &str) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        states.entry(pool.to_string())
            .or_insert_with(|| FibonacciBackoff::new(REQUEUE_MIN, REQUEUE_MAX))
            .next_backoff()
    }

    pub fn reset(&self, pool: &str) {
        let mut states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        states.remove(pool);
    }
}
