use crate::config::AnalysisConfig;
use crate::detect::classify::Thresholds;
use crate::detect::record::AnomalyRecord;
use crate::detect::rolling::rolling_points;
use crate::detect::segment::{segment, EntityKey, Observation, Segment};
use crate::detect::DetectError;
use rayon::prelude::*;
use tracing::{debug, info};

/// Result of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Flagged points, ordered by entity key then timestamp.
    pub records: Vec<AnomalyRecord>,
    /// Segments long enough to evaluate at least one point.
    pub segments_analyzed: usize,
    /// Segments with `window_size` observations or fewer.
    pub segments_skipped: usize,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Batch spike detector configured once per run.
pub struct AnomalyDetector {
    window: usize,
    thresholds: Thresholds,
    parallel: bool,
}

impl AnomalyDetector {
    pub fn new(config: &AnalysisConfig) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self {
            window: config.window_size,
            thresholds: Thresholds::from(config),
            parallel: config.parallel,
        })
    }

    /// Run segmentation, rolling statistics and classification over the
    /// whole observation table.
    pub fn detect(&self, observations: Vec<Observation>) -> Detection {
        let segments: Vec<(EntityKey, Segment)> = segment(observations).into_iter().collect();
        info!(
            segments = segments.len(),
            window = self.window,
            k = self.thresholds.std_dev_threshold,
            floor = self.thresholds.absolute_floor,
            parallel = self.parallel,
            "Running spike detection"
        );

        // Indexed collect keeps segment order in both modes.
        let per_segment: Vec<Option<Vec<AnomalyRecord>>> = if self.parallel {
            segments
                .par_iter()
                .map(|(key, seg)| self.analyze_segment(key, seg))
                .collect()
        } else {
            segments
                .iter()
                .map(|(key, seg)| self.analyze_segment(key, seg))
                .collect()
        };

        let mut detection = Detection::default();
        for result in per_segment {
            match result {
                Some(records) => {
                    detection.segments_analyzed += 1;
                    detection.records.extend(records);
                }
                None => detection.segments_skipped += 1,
            }
        }

        for rec in &detection.records {
            info!(
                date = %rec.date,
                track = %rec.track_name,
                country = %rec.country,
                views = rec.views,
                local_average = rec.local_average,
                "Anomaly detected"
            );
        }

        detection
    }

    /// `None` when the segment is too short to evaluate any point.
    fn analyze_segment(&self, key: &EntityKey, seg: &Segment) -> Option<Vec<AnomalyRecord>> {
        debug!(track = %key.track_name, country = %key.country, points = seg.observations.len(), "Analyzing segment");

        if seg.observations.len() <= self.window {
            return None;
        }

        let values = seg.views();
        let records = rolling_points(&values, self.window, self.thresholds.std_dev_threshold)
            .into_iter()
            .filter(|point| self.thresholds.is_anomalous(values[point.index], point))
            .map(|point| AnomalyRecord::from_observation(&seg.observations[point.index], &point))
            .collect();

        Some(records)
    }
}
