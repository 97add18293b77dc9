// FILE: src/core/budget.rs
//! Wall-clock budget for one sweep.
//!
//! Uses `tokio::time::Instant` so tests can run under a paused clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    pub fn start(limit: Duration) -> Self {
        Self { started: Instant::now(), limit }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}
