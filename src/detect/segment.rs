//! Grouping of observations into independent, time-ordered series.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// Identity of one independent time series.
///
/// Field order defines the segment emission order, so detection output is
/// sorted by track id, then name, artist and country.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub country: String,
}

/// One cleaned input row.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: EntityKey,
    pub timestamp: NaiveDateTime,
    pub views: f64,
    pub platform: String,
}

/// Observations sharing one [`EntityKey`], ascending by timestamp.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub observations: Vec<Observation>,
}

impl Segment {
    pub fn views(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.views).collect()
    }
}

/// Split the observation table into one segment per entity key.
///
/// Equal timestamps keep their input order (the sort is stable); nothing is
/// deduplicated.
pub fn segment(observations: Vec<Observation>) -> BTreeMap<EntityKey, Segment> {
    let mut segments: BTreeMap<EntityKey, Segment> = BTreeMap::new();

    for obs in observations {
        segments
            .entry(obs.key.clone())
            .or_default()
            .observations
            .push(obs);
    }

    for seg in segments.values_mut() {
        seg.observations.sort_by_key(|o| o.timestamp);
    }

    segments
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn key(track: &str, country: &str) -> EntityKey {
        EntityKey {
            track_id: track.to_string(),
            track_name: format!("{} name", track),
            artist_name: "Synthwave Surfer".to_string(),
            country: country.to_string(),
        }
    }

    pub(crate) fn obs(track: &str, country: &str, day: u32, views: f64) -> Observation {
        Observation {
            key: key(track, country),
            timestamp: NaiveDate::from_ymd_opt(2025, 7, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            views,
            platform: "YouTube Shorts".to_string(),
        }
    }

    #[test]
    fn test_groups_by_full_key() {
        let segments = segment(vec![
            obs("T1", "US", 1, 10.0),
            obs("T1", "DE", 1, 20.0),
            obs("T1", "US", 2, 30.0),
            obs("T2", "US", 1, 40.0),
        ]);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[&key("T1", "US")].observations.len(), 2);
        assert_eq!(segments[&key("T1", "DE")].observations.len(), 1);
        assert_eq!(segments[&key("T2", "US")].observations.len(), 1);
    }

    #[test]
    fn test_sorts_within_segment() {
        let segments = segment(vec![
            obs("T1", "US", 3, 3.0),
            obs("T1", "US", 1, 1.0),
            obs("T1", "US", 2, 2.0),
        ]);

        assert_eq!(segments[&key("T1", "US")].views(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_timestamps_keep_input_order() {
        let segments = segment(vec![
            obs("T1", "US", 2, 7.0),
            obs("T1", "US", 1, 5.0),
            obs("T1", "US", 2, 9.0),
        ]);

        assert_eq!(segments[&key("T1", "US")].views(), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_iteration_order_is_key_order() {
        let segments = segment(vec![
            obs("T2", "US", 1, 1.0),
            obs("T1", "US", 1, 1.0),
            obs("T1", "DE", 1, 1.0),
        ]);

        let keys: Vec<_> = segments
            .keys()
            .map(|k| (k.track_id.as_str(), k.country.as_str()))
            .collect();
        assert_eq!(keys, vec![("T1", "DE"), ("T1", "US"), ("T2", "US")]);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment(Vec::new()).is_empty());
    }
}
