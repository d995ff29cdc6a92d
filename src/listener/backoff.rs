//! Fixed-interval reconnect backoff.

use std::time::Duration;

use crate::cancel::CancelToken;

/// Counts consecutive failures and waits a fixed interval between attempts.
#[derive(Debug)]
pub struct ReconnectBackoff {
    interval: Duration,
    failures: u64,
}

impl ReconnectBackoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            failures: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a failure and return the consecutive failure count.
    pub fn record_failure(&mut self) -> u64 {
        self.failures += 1;
        self.failures
    }

    /// Reset the failure count after a successful connect.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Sleep for the interval. Returns `true` if cancelled meanwhile.
    pub fn wait(&self, cancel: &CancelToken) -> bool {
        cancel.wait(self.interval)
    }
}
