//! Handoff records for flagged observations.

use serde::{Deserialize, Serialize};

use super::rolling::RollingPoint;
use super::segment::Observation;

/// One detected spike.
///
/// Field order is the serialized order of the handoff artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub country: String,
    pub views: i64,
    /// Moving average of the preceding window, two decimals.
    pub local_average: f64,
    pub platform: String,
}

impl AnomalyRecord {
    pub fn from_observation(obs: &Observation, point: &RollingPoint) -> Self {
        Self {
            date: obs.timestamp.format("%Y-%m-%d").to_string(),
            track_id: obs.key.track_id.clone(),
            track_name: obs.key.track_name.clone(),
            artist_name: obs.key.artist_name.clone(),
            country: obs.key.country.clone(),
            // truncates toward zero
            views: obs.views as i64,
            local_average: round2(point.moving_avg),
            platform: obs.platform.clone(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
