use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::metrics::{Meter, RateWindow, SlidingWindowReservoir};
use crate::utils::constants::RESERVOIR_SIZE;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Point-in-time view of a recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub one_minute_rate: f64,
    pub five_minute_rate: f64,
    pub fifteen_minute_rate: f64,
    pub mean_rate: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl MetricsSnapshot {
    pub fn progress_line(&self) -> String {
        format!(
            "Line number: {}\tOps/s (1/5/15 min): {:.1} / {:.1} / {:.1}\t\
             Insert latency: p95 {:.3} ms, p99 {:.3} ms",
            self.count,
            self.one_minute_rate,
            self.five_minute_rate,
            self.fifteen_minute_rate,
            self.p95_ms,
            self.p99_ms
        )
    }
}

struct Inner {
    meter: Meter,
    reservoir: SlidingWindowReservoir,
}

/// Submission timer: latency distribution plus moving throughput.
///
/// Shared between concurrent submissions through an `Arc`; lives for one
/// load and is dropped with its `LoadContext`.
pub struct MetricsRecorder {
    inner: Mutex<Inner>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(start: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                meter: Meter::new(start),
                reservoir: SlidingWindowReservoir::new(RESERVOIR_SIZE),
            }),
        }
    }

    pub fn record(&self, duration_nanos: u64) {
        self.record_at(duration_nanos, Instant::now());
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX));
    }

    pub fn record_at(&self, duration_nanos: u64, now: Instant) {
        let mut inner = self.lock();
        inner.meter.mark_at(1, now);
        inner.reservoir.update(duration_nanos);
    }

    /// Operations per second over the given window
    pub fn rate(&self, window: RateWindow) -> f64 {
        self.rate_at(window, Instant::now())
    }

    pub fn rate_at(&self, window: RateWindow, now: Instant) -> f64 {
        self.lock().meter.rate_at(window, now)
    }

    pub fn mean_rate(&self) -> f64 {
        self.lock().meter.mean_rate_at(Instant::now())
    }

    /// Latency at quantile `p` (0.0..=1.0), in milliseconds
    pub fn percentile(&self, p: f64) -> f64 {
        self.lock().reservoir.snapshot().value(p) / NANOS_PER_MILLI
    }

    pub fn count(&self) -> u64 {
        self.lock().meter.count()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let mut inner = self.lock();
        let latencies = inner.reservoir.snapshot();
        MetricsSnapshot {
            count: inner.meter.count(),
            one_minute_rate: inner.meter.rate_at(RateWindow::OneMinute, now),
            five_minute_rate: inner.meter.rate_at(RateWindow::FiveMinutes, now),
            fifteen_minute_rate: inner.meter.rate_at(RateWindow::FifteenMinutes, now),
            mean_rate: inner.meter.mean_rate_at(now),
            p95_ms: latencies.value(0.95) / NANOS_PER_MILLI,
            p99_ms: latencies.value(0.99) / NANOS_PER_MILLI,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_percentiles_in_milliseconds() {
        let recorder = MetricsRecorder::new();
        for ms in 1..=100u64 {
            recorder.record(ms * 1_000_000);
        }

        assert_eq!(recorder.count(), 100);
        // pos = 0.95 * 101 = 95.95 -> between 95 and 96 ms
        assert!((recorder.percentile(0.95) - 95.95).abs() < 1e-6);
        assert!((recorder.percentile(0.99) - 99.99).abs() < 1e-6);
    }

    #[test]
    fn test_rates_follow_ticks() {
        let start = Instant::now();
        let recorder = MetricsRecorder::started_at(start);
        for _ in 0..10 {
            recorder.record_at(1_000, start);
        }

        let later = start + Duration::from_secs(5);
        assert!((recorder.rate_at(RateWindow::OneMinute, later) - 2.0).abs() < 1e-9);
        assert!((recorder.rate_at(RateWindow::FiveMinutes, later) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_recording() {
        let recorder = Arc::new(MetricsRecorder::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        recorder.record(500_000);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.count, 1000);
        assert!((snapshot.p99_ms - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_line_reports_every_window() {
        let snapshot = MetricsSnapshot {
            count: 5000,
            one_minute_rate: 120.0,
            five_minute_rate: 80.5,
            fifteen_minute_rate: 40.0,
            mean_rate: 100.0,
            p95_ms: 1.5,
            p99_ms: 3.25,
        };

        assert_eq!(
            snapshot.progress_line(),
            "Line number: 5000\tOps/s (1/5/15 min): 120.0 / 80.5 / 40.0\t\
             Insert latency: p95 1.500 ms, p99 3.250 ms"
        );
    }

    #[test]
    fn test_empty_recorder() {
        let snapshot = MetricsRecorder::new().snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.p95_ms, 0.0);
        assert_eq!(snapshot.mean_rate, 0.0);
    }
}
