use std::collections::VecDeque;

/// Keeps the most recent `capacity` latency samples, in nanoseconds.
#[derive(Debug, Clone)]
pub struct SlidingWindowReservoir {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl SlidingWindowReservoir {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn update(&mut self, value: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut values: Vec<u64> = self.samples.iter().copied().collect();
        values.sort_unstable();
        Snapshot { values }
    }
}

/// Sorted copy of the reservoir at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<u64>,
}

impl Snapshot {
    /// Interpolated value at `quantile` (0.0..=1.0), using `pos = q * (n + 1)`.
    pub fn value(&self, quantile: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let quantile = quantile.clamp(0.0, 1.0);
        let pos = quantile * (self.values.len() + 1) as f64;
        let index = pos as usize;

        if index < 1 {
            return self.values[0] as f64;
        }
        if index >= self.values.len() {
            return self.values[self.values.len() - 1] as f64;
        }

        let lower = self.values[index - 1] as f64;
        let upper = self.values[index] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
