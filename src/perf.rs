// Timing guard for slow monitor operations

use std::time::{Duration, Instant};

/// Logs a warning on the `perf` target when dropped after `threshold_ms`
pub struct PerfTimer {
    name: &'static str,
    start: Instant,
    threshold_ms: u64,
}

impl PerfTimer {
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            name,
            start: Instant::now(),
            threshold_ms,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed.as_millis() >= self.threshold_ms as u128
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if self.is_slow(elapsed) {
            tracing::warn!(
                target: "perf",
                operation = self.name,
                duration_ms = elapsed.as_millis() as u64,
                "Slow operation detected"
            );
        }
    }
}
