// Movie metadata extraction (C6, movie branch) via the external ffprobe binary.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{CatalogIngestError, Result};

#[derive(Debug, Clone, Default)]
pub struct MovieMetadata {
    /// The full ffprobe JSON document, used for the flattened `MediaMetadata` rows.
    pub raw: Value,
    pub media_create_date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub fn probe(path: &Path) -> Result<MovieMetadata> {
    let output = Command::new(crate::tools::ffprobe_path())
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| CatalogIngestError::Format(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CatalogIngestError::Format(format!("ffprobe failed: {stderr}")));
    }

    let raw: Value = serde_json::from_slice(&output.stdout)?;

    let media_create_date = raw
        .pointer("/format/tags/creation_time")
        .and_then(|v| v.as_str())
        .and_then(parse_creation_time);

    let (latitude, longitude) = location_from_streams(&raw);

    Ok(MovieMetadata {
        raw,
        media_create_date,
        latitude,
        longitude,
    })
}

fn parse_creation_time(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Parses the canonical ISO-6709 two-field form `"+LAT-LONG/"` (or
/// `"-LAT+LONG/"`, etc). Anything else — a third field, a missing sign, a
/// missing terminator — is treated as malformed and yields `(None, None)`
/// rather than guessed at, per this rewrite's conservative location-parsing
/// policy.
fn parse_iso6709(location: &str) -> Option<(f64, f64)> {
    let re = Regex::new(r"^([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)/$").ok()?;
    let caps = re.captures(location)?;
    let lat: f64 = caps.get(1)?.as_str().parse().ok()?;
    let lon: f64 = caps.get(2)?.as_str().parse().ok()?;
    Some((lat, lon))
}

fn location_from_streams(raw: &Value) -> (Option<f64>, Option<f64>) {
    let streams = match raw.get("streams").and_then(|v| v.as_array()) {
        Some(s) => s,
        None => return (None, None),
    };
    for stream in streams {
        if let Some(location) = stream.pointer("/tags/location").and_then(|v| v.as_str()) {
            if let Some((lat, lon)) = parse_iso6709(location) {
                return (Some(lat), Some(lon));
            }
            return (None, None);
        }
    }
    (None, None)
}

pub fn is_available() -> bool {
    crate::tools::is_tool_available(&crate::tools::ffprobe_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_z_suffixed_creation_time() {
        let dt = parse_creation_time("2023-05-04T12:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-05-04T12:00:00+00:00");
    }

    #[test]
    fn parses_canonical_iso6709_pair() {
        let (lat, lon) = parse_iso6709("+37.3861-122.0839/").unwrap();
        assert!((lat - 37.3861).abs() < 1e-9);
        assert!((lon + 122.0839).abs() < 1e-9);
    }

    #[test]
    fn rejects_missing_terminator() {
        assert!(parse_iso6709("+37.3861-122.0839").is_none());
    }

    #[test]
    fn rejects_three_field_iso6709_form() {
        // Altitude-bearing ISO-6709 strings are a longer valid form this
        // system deliberately does not attempt to guess at.
        assert!(parse_iso6709("+37.3861-122.0839+015.0/").is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iso6709("not a location").is_none());
    }
}
