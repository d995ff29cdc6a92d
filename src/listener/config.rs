//! Receive-loop settings.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Default wait between a fault and the next connect attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
/// Name of the receive thread.
pub const THREAD_NAME: &str = "logfeed-receive";

/// Settings for the receive loop and its thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Fixed wait after a fault before reconnecting.
    pub backoff: Duration,
    /// Minimum spacing of repeated connection-fault warnings.
    pub warn_interval: Duration,
    pub thread_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            warn_interval: DEFAULT_WARN_INTERVAL,
            thread_name: THREAD_NAME.to_owned(),
        }
    }
}
