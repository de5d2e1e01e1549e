//! Anomaly predicate: statistically high AND practically large.

use super::rolling::RollingPoint;
use crate::config::AnalysisConfig;

/// Classification parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Multiplier `K` on the moving standard deviation.
    pub std_dev_threshold: f64,
    /// Minimum absolute magnitude a flagged value must exceed.
    pub absolute_floor: f64,
}

impl From<&AnalysisConfig> for Thresholds {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            std_dev_threshold: cfg.std_dev_threshold,
            absolute_floor: cfg.absolute_floor,
        }
    }
}

impl Thresholds {
    /// A value is anomalous only when it is strictly above both the adaptive
    /// upper band and the absolute floor.
    pub fn is_anomalous(&self, value: f64, point: &RollingPoint) -> bool {
        value > point.upper_band && value > self.absolute_floor
    }
}
