//! Small helpers shared across the pipeline stages.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks per-second throughput of one pipeline stage and logs it at debug level.
pub struct FpsCounter {
    stage: &'static str,
    frame_count: u32,
    window_start: Instant,
    interval: Duration,
}

impl FpsCounter {
    /// Counter for `stage` reporting once per second.
    pub fn new(stage: &'static str) -> Self {
        Self::with_interval(stage, Duration::from_secs(1))
    }

    pub fn with_interval(stage: &'static str, interval: Duration) -> Self {
        Self {
            stage,
            frame_count: 0,
            window_start: Instant::now(),
            interval,
        }
    }

    /// Counts one frame. Returns the rate once per interval.
    pub fn update(&mut self) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        tracing::debug!(stage = self.stage, fps, "throughput");
        self.frame_count = 0;
        self.window_start = Instant::now();
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_after_interval() {
        let mut counter = FpsCounter::with_interval("test", Duration::ZERO);
        assert!(counter.update().is_some());

        let mut slow = FpsCounter::with_interval("test", Duration::from_secs(3600));
        assert!(slow.update().is_none());
    }
}
