// Image metadata extraction (C6, image branch) via the external exiftool binary.

use std::path::Path;
use std::process::Command;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::{CatalogIngestError, Result};

#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    /// The full tag map exactly as returned by exiftool, used for the
    /// flattened `MediaMetadata` rows.
    pub raw: Value,
    pub media_create_date: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Run exiftool on an image and extract its metadata map, the parsed
/// `EXIF:DateTimeOriginal` create date, and signed GPS coordinates.
pub fn extract(path: &Path) -> Result<ImageMetadata> {
    let output = Command::new(crate::tools::exiftool_path())
        .args(["-j", "-n", "-G1"])
        .arg(path)
        .output()
        .map_err(|e| CatalogIngestError::Format(format!("failed to run exiftool: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CatalogIngestError::Format(format!("exiftool failed: {stderr}")));
    }

    let parsed: Vec<Value> = serde_json::from_slice(&output.stdout)?;
    let raw = parsed.into_iter().next().unwrap_or_else(|| Value::Object(Default::default()));

    let media_create_date = tag(&raw, "DateTimeOriginal")
        .and_then(|v| v.as_str())
        .and_then(parse_exif_datetime);

    let (latitude, longitude) = gps_coordinates(&raw);

    Ok(ImageMetadata {
        raw,
        media_create_date,
        latitude,
        longitude,
    })
}

/// Tolerant lookup: exiftool's group-1 prefixes vary by build/tag (`EXIF:`,
/// `GPS:`, occasionally ungrouped); match on the bare tag name as a suffix.
fn tag<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    let map = raw.as_object()?;
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    map.iter()
        .find(|(k, _)| k.ends_with(&format!(":{name}")))
        .map(|(_, v)| v)
}

/// Parses the single EXIF datetime format this system recognizes:
/// `YYYY:MM:DD HH:MM:SS`. Anything else is treated as absent — no POSIX
/// timestamp fallback.
fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S").ok()
}

fn gps_coordinates(raw: &Value) -> (Option<f64>, Option<f64>) {
    let lat = tag(raw, "GPSLatitude").and_then(numeric);
    let lon = tag(raw, "GPSLongitude").and_then(numeric);
    let lat_ref = tag(raw, "GPSLatitudeRef").and_then(|v| v.as_str()).map(str::to_string);
    let lon_ref = tag(raw, "GPSLongitudeRef").and_then(|v| v.as_str()).map(str::to_string);

    let lat = lat.map(|v| if lat_ref.as_deref() == Some("S") { -v } else { v });
    let lon = lon.map(|v| if lon_ref.as_deref() == Some("W") { -v } else { v });

    match (lat, lon) {
        (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => (Some(lat), Some(lon)),
        _ => (None, None),
    }
}

fn numeric(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

pub fn is_available() -> bool {
    crate::tools::is_tool_available(&crate::tools::exiftool_path())
}
