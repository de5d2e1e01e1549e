//! Engagement CSV reader.
//!
//! Structural problems (missing file, unreadable header, missing column) are
//! fatal. Row-level problems drop the row and are counted.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{info, warn};

use crate::detect::{EntityKey, Observation};

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "date",
    "track_id",
    "track_name",
    "artist_name",
    "country",
    "views",
    "platform",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("data file not found: {0}")]
    NotFound(String),

    #[error("failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("required column '{0}' missing from header")]
    MissingColumn(&'static str),
}

/// Cleaned observations plus what was thrown away on the way.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub observations: Vec<Observation>,
    pub rows_read: usize,
    pub dropped_encoding: usize,
    pub dropped_dates: usize,
    pub dropped_values: usize,
}

impl IngestReport {
    pub fn dropped(&self) -> usize {
        self.dropped_encoding + self.dropped_dates + self.dropped_values
    }
}

/// Read and clean the engagement table at `path`.
pub fn load_observations(path: &Path) -> Result<IngestReport, IngestError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IngestError::NotFound(path.display().to_string()),
        _ => IngestError::Io(e),
    })?;

    let report = read_observations(BufReader::new(file))?;
    info!(
        path = %path.display(),
        rows = report.rows_read,
        kept = report.observations.len(),
        "Loaded engagement data"
    );
    Ok(report)
}

/// Parse engagement rows from any reader with a header line.
pub fn read_observations<R: Read>(reader: R) -> Result<IngestReport, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut idx = [0usize; 7];
    for (slot, name) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or(IngestError::MissingColumn(name))?;
    }

    let mut report = IngestReport::default();
    for result in reader.byte_records() {
        let record = result?;
        report.rows_read += 1;

        let Some([date, track_id, track_name, artist_name, country, views, platform]) =
            decode_fields(&record, &idx)
        else {
            report.dropped_encoding += 1;
            continue;
        };

        let Some(timestamp) = parse_timestamp(date) else {
            report.dropped_dates += 1;
            continue;
        };
        let Some(views) = parse_views(views) else {
            report.dropped_values += 1;
            continue;
        };

        report.observations.push(Observation {
            key: EntityKey {
                track_id: track_id.to_string(),
                track_name: track_name.to_string(),
                artist_name: artist_name.to_string(),
                country: country.to_string(),
            },
            timestamp,
            views,
            platform: platform.to_string(),
        });
    }

    if report.dropped_encoding > 0 {
        warn!(dropped = report.dropped_encoding, "Dropped rows that are not valid UTF-8");
    }
    if report.dropped_dates > 0 {
        warn!(dropped = report.dropped_dates, "Dropped rows with unparseable dates");
    }
    if report.dropped_values > 0 {
        warn!(dropped = report.dropped_values, "Dropped rows with unparseable view counts");
    }

    Ok(report)
}

/// The required cells of one row, in `REQUIRED_COLUMNS` order. A missing
/// cell reads as empty; a cell that is not UTF-8 rejects the row.
fn decode_fields<'r>(record: &'r csv::ByteRecord, idx: &[usize; 7]) -> Option<[&'r str; 7]> {
    let mut fields = [""; 7];
    for (slot, &i) in fields.iter_mut().zip(idx) {
        *slot = std::str::from_utf8(record.get(i).unwrap_or(b"")).ok()?;
    }
    Some(fields)
}

/// Coerce a date cell. Date-only values land on midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_views(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
