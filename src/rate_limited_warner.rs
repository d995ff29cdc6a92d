use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default minimum spacing between repeated warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Helper that rate limits repeated fault warnings.
///
/// The caller counts each occurrence via [`record`](Self::record). The next
/// call to [`warn_if_due`](Self::warn_if_due) emits a warning through the
/// provided callback if the configured interval has elapsed, passing the
/// number of occurrences since the last emission. [`flush`](Self::flush)
/// emits immediately if anything is pending.
pub struct RateLimitedWarner {
    origin: Instant,
    interval_ms: u64,
    last_warn_ms: AtomicU64,
    pending: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a warner whose first warning is emitted immediately.
    pub fn new(interval: Duration) -> Self {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self {
            origin: Instant::now(),
            interval_ms,
            last_warn_ms: AtomicU64::new(0),
            pending: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        // Offset by the interval so the first warning is always due.
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        elapsed.saturating_add(self.interval_ms)
    }

    /// Count one occurrence.
    pub fn record(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = self.now_ms();
        let prev = self.last_warn_ms.load(Ordering::Relaxed);
        if now.saturating_sub(prev) >= self.interval_ms {
            let count = self.pending.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
                self.last_warn_ms.store(now, Ordering::Relaxed);
            }
        }
    }

    /// Immediately warn about anything pending.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn_ms.store(self.now_ms(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
