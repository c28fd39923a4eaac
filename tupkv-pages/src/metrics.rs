//! Observability counters for the sink and the source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic event/byte counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wall-clock time accumulator. [`WallTimer::start`] returns a guard that
/// adds its elapsed time on drop, so every exit path is accounted for.
#[derive(Debug, Default)]
pub struct WallTimer {
    nanos: AtomicU64,
}

impl WallTimer {
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            t0: Instant::now(),
            timer: self,
        }
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

pub struct TimerGuard<'a> {
    t0: Instant,
    timer: &'a WallTimer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer
            .nanos
            .fetch_add(self.t0.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }
}

/// Write-side counters.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Pages committed (single and batched paths).
    pub n_page_committed: Counter,
    /// Uncompressed bytes fed to the sealer.
    pub sz_zip: Counter,
    /// Sealed bytes handed to the driver.
    pub sz_write_payload: Counter,
    pub time_wall_zip: WallTimer,
    pub time_wall_write: WallTimer,
}

/// Read-side counters. `n_read` and `n_read_v` count attempts; the
/// remaining counters track successes.
#[derive(Debug, Default)]
pub struct SourceMetrics {
    pub n_read: Counter,
    pub n_read_v: Counter,
    pub n_page_loaded: Counter,
    pub n_page_populated: Counter,
    pub n_cluster_loaded: Counter,
    pub sz_read_payload: Counter,
    pub sz_unzip: Counter,
    pub time_wall_read: WallTimer,
    pub time_wall_unzip: WallTimer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_accumulates_on_drop() {
        let timer = WallTimer::default();
        {
            let _guard = timer.start();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(timer.total() >= Duration::from_millis(1));
    }

    #[test]
    fn counters_count() {
        let c = Counter::default();
        c.inc();
        c.add(4);
        assert_eq!(c.get(), 5);
    }
}
