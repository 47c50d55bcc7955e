//! Exponential back-off for bounded retries.

use std::time::Duration;

/// Doubles the wait on every call, capped at `max_wait`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_wait: Duration,
    max_wait: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(init_wait: Duration, max_wait: Duration) -> Self {
        Self {
            current_wait: init_wait,
            max_wait: max_wait.max(init_wait),
            attempts: 0,
        }
    }

    /// Return the wait before the next attempt and advance the schedule
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current_wait;
        self.current_wait = (self.current_wait * 2).min(self.max_wait);
        self.attempts += 1;
        wait
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
