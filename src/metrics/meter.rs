use std::time::{Duration, Instant};

use crate::utils::constants::EWMA_TICK_SECONDS;

const TICK_INTERVAL: Duration = Duration::from_secs(EWMA_TICK_SECONDS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateWindow {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl RateWindow {
    pub fn minutes(&self) -> f64 {
        match self {
            RateWindow::OneMinute => 1.0,
            RateWindow::FiveMinutes => 5.0,
            RateWindow::FifteenMinutes => 15.0,
        }
    }
}

/// Exponentially-weighted moving average of events per second, updated in
/// fixed ticks. The first tick seeds the average with the instant rate.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    pub fn new(window: RateWindow) -> Self {
        let tick = TICK_INTERVAL.as_secs_f64();
        Self {
            alpha: 1.0 - (-tick / 60.0 / window.minutes()).exp(),
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    pub fn update(&mut self, n: u64) {
        self.uncounted += n;
    }

    pub fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Events per second
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Event count with 1, 5 and 15 minute moving rates.
#[derive(Debug, Clone)]
pub struct Meter {
    count: u64,
    start: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl Meter {
    pub fn new(start: Instant) -> Self {
        Self {
            count: 0,
            start,
            last_tick: start,
            m1: Ewma::new(RateWindow::OneMinute),
            m5: Ewma::new(RateWindow::FiveMinutes),
            m15: Ewma::new(RateWindow::FifteenMinutes),
        }
    }

    pub fn mark_at(&mut self, n: u64, now: Instant) {
        self.tick_if_necessary(now);
        self.count += n;
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    pub fn rate_at(&mut self, window: RateWindow, now: Instant) -> f64 {
        self.tick_if_necessary(now);
        match window {
            RateWindow::OneMinute => self.m1.rate(),
            RateWindow::FiveMinutes => self.m5.rate(),
            RateWindow::FifteenMinutes => self.m15.rate(),
        }
    }

    pub fn mean_rate_at(&self, now: Instant) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.count as f64 / elapsed
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn tick_if_necessary(&mut self, now: Instant) {
        let age = now.saturating_duration_since(self.last_tick);
        if age < TICK_INTERVAL {
            return;
        }

        let ticks = age.as_nanos() / TICK_INTERVAL.as_nanos();
        let remainder = Duration::from_nanos((age.as_nanos() % TICK_INTERVAL.as_nanos()) as u64);
        self.last_tick = now - remainder;

        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_seeds_instant_rate() {
        let mut ewma = Ewma::new(RateWindow::OneMinute);
        ewma.update(50);
        ewma.tick();
        assert!((ewma.rate() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_minute_rate_decays() {
        let mut ewma = Ewma::new(RateWindow::OneMinute);
        ewma.update(3);
        ewma.tick();
        assert!((ewma.rate() - 0.6).abs() < 1e-9);

        // one minute of idle ticks
        for _ in 0..12 {
            ewma.tick();
        }
        assert!((ewma.rate() - 0.6 * (-1.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_longer_windows_decay_slower() {
        let mut m1 = Ewma::new(RateWindow::OneMinute);
        let mut m15 = Ewma::new(RateWindow::FifteenMinutes);
        m1.update(100);
        m15.update(100);
        m1.tick();
        m15.tick();
        for _ in 0..12 {
            m1.tick();
            m15.tick();
        }
        assert!(m15.rate() > m1.rate());
    }

    #[test]
    fn test_meter_ticks_on_elapsed_time() {
        let start = Instant::now();
        let mut meter = Meter::new(start);
        meter.mark_at(25, start);

        // no tick has happened yet
        assert_eq!(meter.rate_at(RateWindow::OneMinute, start), 0.0);

        let later = start + Duration::from_secs(5);
        assert!((meter.rate_at(RateWindow::OneMinute, later) - 5.0).abs() < 1e-9);
        assert!((meter.rate_at(RateWindow::FifteenMinutes, later) - 5.0).abs() < 1e-9);
        assert_eq!(meter.count(), 25);
    }

    #[test]
    fn test_mean_rate() {
        let start = Instant::now();
        let mut meter = Meter::new(start);
        meter.mark_at(100, start);
        let rate = meter.mean_rate_at(start + Duration::from_secs(4));
        assert!((rate - 25.0).abs() < 1e-9);
        assert_eq!(Meter::new(start).mean_rate_at(start), 0.0);
    }
}
