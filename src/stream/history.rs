//! Fixed-capacity ring buffer of recent rate samples.

/// Circular window of the most recent rate samples with their mean.
///
/// Slots start at zero, so the mean ramps up over the first `capacity`
/// inserts. The mean is recomputed in full over the window on every insert
/// rather than kept as an incremental running sum; full recomputation is
/// immune to the drift an add/subtract running sum accumulates under
/// floating-point rounding.
#[derive(Debug, Clone)]
pub struct RateHistory {
    samples: Vec<f64>,
    pos: usize,
    average: f64,
}

impl RateHistory {
    /// Create a window of `capacity` slots, all zero. `capacity` must be
    /// at least 1 (enforced by config validation).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            pos: 0,
            average: 0.0,
        }
    }

    /// Record a sample at the write position, advance it modulo the window
    /// length and recompute the mean.
    pub fn push(&mut self, sample: f64) {
        self.samples[self.pos] = sample;
        self.pos = (self.pos + 1) % self.samples.len();
        self.average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
    }

    /// Mean over the whole window, zero slots included.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Number of slots in the window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; the window has a fixed, non-zero slot count.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
