//! Spike detection over per-track, per-country view counts.
//!
//! The engine is a pure batch transformation:
//! observations → segments → causal rolling statistics → classification →
//! anomaly records.

pub mod classify;
pub mod engine;
pub mod record;
pub mod rolling;
pub mod segment;

pub use classify::Thresholds;
pub use engine::{AnomalyDetector, Detection};
pub use record::AnomalyRecord;
pub use rolling::RollingPoint;
pub use segment::{EntityKey, Observation, Segment};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
}
