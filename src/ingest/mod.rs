//! Local fixture loaders for the five input tables: Gamma markets JSON,
//! and resolutions / trades / books / prices CSV exports.

pub mod bundle;
pub mod csv;
pub mod markets;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{file} is missing required column {column}")]
    MissingColumn { file: String, column: String },
}

/// Parse a fixture timestamp to UTC milliseconds. Accepts RFC 3339, naive
/// datetime (assumed UTC), and raw epoch milliseconds.
pub(crate) fn parse_ts_ms(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
        if format == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(value, format) {
                return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
            }
        }
    }
    value.parse::<i64>().ok()
}
