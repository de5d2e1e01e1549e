//! Causal rolling statistics.
//!
//! Every point is judged against the `window` observations strictly before
//! it; the point itself and anything after it never feed its own baseline.

/// Summary statistics over a borrowed window of values.
pub struct WindowStats<'a> {
    values: &'a [f64],
}

impl<'a> WindowStats<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample variance (n - 1 denominator).
    ///
    /// Fewer than two samples leave the variance undefined; it is reported
    /// as 0 so the upper band collapses onto the mean.
    pub fn variance(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self
            .values
            .iter()
            .map(|&x| (x - mean).powi(2))
            .sum();
        sum_sq_diff / (self.values.len() - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Baseline for one observation, derived from the preceding window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingPoint {
    /// Position of the evaluated observation inside its segment.
    pub index: usize,
    pub moving_avg: f64,
    pub moving_std: f64,
    pub upper_band: f64,
}

/// Compute a [`RollingPoint`] for every index `i >= window`, using values
/// `[i - window, i - 1]`.
///
/// Indices below `window` have no history and are skipped, so a series of
/// `window` values or fewer yields nothing.
pub fn rolling_points(values: &[f64], window: usize, k: f64) -> Vec<RollingPoint> {
    if window == 0 || values.len() <= window {
        return Vec::new();
    }

    (window..values.len())
        .map(|i| {
            let stats = WindowStats::new(&values[i - window..i]);
            let moving_avg = stats.mean();
            let moving_std = stats.std_dev();
            RollingPoint {
                index: i,
                moving_avg,
                moving_std,
                upper_band: moving_avg + k * moving_std,
            }
        })
        .collect()
}
