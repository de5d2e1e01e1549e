//! The anomaly artifact passed from detection to reporting.
//!
//! Its presence on disk is the signal that detection completed with at least
//! one anomaly.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::detect::AnomalyRecord;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("anomaly file not found: {0}. Run the detection step first.")]
    Missing(String),

    #[error("failed to access anomaly file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse anomaly file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HandoffError + '_ {
    move |source| HandoffError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Serialize as pretty JSON with four-space indentation.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Write `records` to `path`, replacing any previous artifact atomically.
pub fn write_anomalies(path: &Path, records: &[AnomalyRecord]) -> Result<(), HandoffError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let body = to_pretty_json(&records).map_err(|source| HandoffError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = tmp_path(path);
    {
        let mut file = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(&body).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }
    std::fs::rename(&tmp, path).map_err(io_err(path))?;

    info!(path = %path.display(), count = records.len(), "Saved anomalies");
    Ok(())
}

/// Load the artifact written by [`write_anomalies`].
pub fn read_anomalies(path: &Path) -> Result<Vec<AnomalyRecord>, HandoffError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => HandoffError::Missing(path.display().to_string()),
        _ => HandoffError::Io {
            path: path.display().to_string(),
            source: e,
        },
    })?;

    serde_json::from_str(&content).map_err(|source| HandoffError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a stale artifact left by an earlier run. Absent files are fine.
pub fn clear_anomalies(path: &Path) -> Result<(), HandoffError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale anomaly file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path)(e)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(track: &str) -> AnomalyRecord {
        AnomalyRecord {
            date: "2025-07-04".to_string(),
            track_id: track.to_string(),
            track_name: "Neon Rider".to_string(),
            artist_name: "Synthwave Surfer".to_string(),
            country: "US".to_string(),
            views: 25000,
            local_average: 1234.57,
            platform: "YouTube Shorts".to_string(),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/out/anomalies.json");
        let records = vec![record("T1"), record("T2")];

        write_anomalies(&path, &records).unwrap();
        assert!(!tmp_path(&path).exists());

        let loaded = read_anomalies(&path).unwrap();
        assert_eq!(loaded, records);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n    {\n        \"date\": \"2025-07-04\""));
    }

    #[test]
    fn test_missing_artifact() {
        let err = read_anomalies(Path::new("/nonexistent/anomalies.json")).unwrap_err();
        assert!(matches!(err, HandoffError::Missing(_)));
        assert!(err.to_string().contains("Run the detection step first"));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("anomalies.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(read_anomalies(&path), Err(HandoffError::Parse { .. })));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("anomalies.json");
        write_anomalies(&path, &[record("T1")]).unwrap();

        clear_anomalies(&path).unwrap();
        assert!(!path.exists());
        clear_anomalies(&path).unwrap();
    }
}
