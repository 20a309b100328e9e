// File Processor (C9): the per-file pipeline. One call handles exactly one
// `(file_path, media_type)` pair. Stage order within a call is strict; see
// the module-level comment on `process_image` and `process_movie`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::catalog::schema::{self, LocationUpdate, NewMediaObject};
use crate::config::Config;
use crate::duplicate::{self, CandidateImage};
use crate::error::{CatalogIngestError, Result};
use crate::faces::{self, FaceModel};
use crate::format;
use crate::geocode;
use crate::hash;
use crate::metadata::{exif, ffprobe, flatten_metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Movie,
}

impl MediaType {
    fn as_db_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Movie => "movie",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { media_object_id: i64 },
    Duplicate { match_filename: String, mse: Option<f64> },
}

/// Runs the full pipeline for one file, including the `JobRun` audit
/// lifecycle: a row is inserted before dispatch and updated exactly once,
/// on every exit path, with the outcome.
pub fn run(conn: &mut Connection, config: &Config, model: &dyn FaceModel, file_path: &Path, media_type: MediaType) -> Result<Outcome> {
    let job_id = schema::start_job_run(conn, &file_path.to_string_lossy(), media_type.as_db_str())?;

    let result = match media_type {
        MediaType::Image => process_image(conn, config, model, file_path),
        MediaType::Movie => process_movie(conn, config, file_path),
    };

    match &result {
        Ok(Outcome::Success { media_object_id }) => {
            schema::finish_job_run(conn, job_id, "success", Some(*media_object_id), None)?;
        }
        Ok(Outcome::Duplicate { .. }) => {
            schema::finish_job_run(conn, job_id, "duplicate", None, None)?;
        }
        Err(e) => {
            schema::finish_job_run(conn, job_id, "error", None, Some(&e.to_string()))?;
            if let Err(move_err) = move_to_errors(config, file_path) {
                log::error!("failed to move {} to errors directory: {move_err}", file_path.display());
            }
        }
    }

    result
}

fn move_to_errors(config: &Config, file_path: &Path) -> Result<()> {
    if !file_path.exists() {
        return Ok(());
    }
    fs::create_dir_all(&config.error_directory)?;
    let dest = config.error_directory.join(file_path.file_name().ok_or_else(|| {
        CatalogIngestError::Other(format!("{} has no file name", file_path.display()))
    })?);
    fs::rename(file_path, dest)?;
    Ok(())
}

fn canonical_name(media_object_id: i64, date: Option<&str>, extension: &str) -> String {
    let date_segment = date
        .and_then(|d| NaiveDate::parse_from_str(&d[..10.min(d.len())], "%Y-%m-%d").ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "UnknownDate".to_string());
    format!("{date_segment}-{media_object_id:07}.{extension}")
}

/// Rust's `Display` for `f64` drops the fractional part for whole numbers
/// (`0.0` renders as `"0"`), but filenames need to match the historical
/// float-repr style (`"0.0"`, `"12.5"`). Append `.0` when Display produced a
/// bare integer.
fn format_mse(mse: f64) -> String {
    let rendered = format!("{mse}");
    if rendered.contains('.') || rendered.contains('e') || rendered.contains('E') || rendered.contains("inf") || rendered.contains("NaN") {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

fn duplicate_name(orig_stem: &str, dup_stem: &str, mse: Option<f64>, extension: &str) -> String {
    match mse {
        Some(mse) => format!("{orig_stem}-DUP_OF_{dup_stem} (mse-{}).{extension}", format_mse(mse)),
        None => format!("{orig_stem}-DUP_OF_{dup_stem}.{extension}"),
    }
}

fn process_image(conn: &mut Connection, config: &Config, model: &dyn FaceModel, file_path: &Path) -> Result<Outcome> {
    // 1. Normalize
    let normalized_path = format::normalize(file_path)?;
    let extension = normalized_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg")
        .to_string();
    let orig_stem = normalized_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    // 2. Fingerprint
    let fingerprint = crate::fingerprint::fingerprint(&normalized_path)?;

    // 3. Prefilter duplicates
    let candidates: Vec<CandidateImage> = schema::fetch_tensor_candidates_by_hash(conn, &fingerprint.hash_a, &fingerprint.hash_b)?;

    // 4. Confirm duplicates
    let matches = duplicate::confirm_image_duplicates(
        &fingerprint.tensor_a,
        &fingerprint.tensor_b,
        &candidates,
        config.mse_threshold,
        crate::constants::DUPLICATE_COMPARE_POOL_SIZE,
    );
    if let Some(best) = matches.into_iter().next() {
        let dup_stem = Path::new(&best.filename).file_stem().and_then(|s| s.to_str()).unwrap_or(&best.filename).to_string();
        let new_name = duplicate_name(&orig_stem, &dup_stem, Some(best.mse), &extension);
        fs::create_dir_all(&config.duplicate_directory)?;
        fs::rename(&normalized_path, config.duplicate_directory.join(&new_name))?;
        return Ok(Outcome::Duplicate { match_filename: best.filename, mse: Some(best.mse) });
    }

    // 5. Extract metadata
    let image_meta = exif::extract(&normalized_path).unwrap_or_default();

    // 6. Insert MediaObject
    let media_object_id = schema::insert_media_object(
        conn,
        &NewMediaObject {
            orig_name: orig_stem.clone(),
            media_type: "image",
            media_create_date: image_meta.media_create_date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            width: None,
            height: None,
            created_by: Some(crate::tools::current_user()),
            created_ip: crate::tools::local_ip(),
            ..Default::default()
        },
    )?;

    // 7. Compute new name
    let date_str = image_meta.media_create_date.map(|d| d.format("%Y-%m-%d").to_string());
    let new_name = canonical_name(media_object_id, date_str.as_deref(), &extension);

    // 8. Geocode
    let location = match (image_meta.latitude, image_meta.longitude) {
        (Some(lat), Some(lon)) => geocode::reverse_geocode(lat, lon, &config.geocoder_user_agent, &config.geocoder_base_url),
        _ => None,
    };

    // 9. Update MediaObject
    schema::update_media_object_location(
        conn,
        media_object_id,
        &LocationUpdate {
            latitude: image_meta.latitude,
            longitude: image_meta.longitude,
            class: location.as_ref().and_then(|l| l.class.clone()),
            kind: location.as_ref().and_then(|l| l.kind.clone()),
            name: location.as_ref().and_then(|l| l.name.clone()),
            display_name: location.as_ref().and_then(|l| l.display_name.clone()),
            city: location.as_ref().and_then(|l| l.city.clone()),
            province: location.as_ref().and_then(|l| l.province.clone()),
            country: location.as_ref().and_then(|l| l.country.clone()),
        },
    )?;
    schema::update_media_object_path(conn, media_object_id, &new_name, &config.image_directory.to_string_lossy())?;

    // 10. Insert metadata rows
    let flattened = flatten_metadata(&image_meta.raw);
    schema::insert_metadata_rows(conn, media_object_id, &flattened)?;

    // 11. Move file to images_dir/new_name
    fs::create_dir_all(&config.image_directory)?;
    let final_path: PathBuf = config.image_directory.join(&new_name);
    fs::rename(&normalized_path, &final_path)?;

    // 12. Label faces
    faces::label_faces_in_image(conn, model, &final_path, media_object_id)?;

    // 13. Insert image tensor, link back to MediaObject
    let tensor_id = schema::insert_image_tensor(
        conn,
        &new_name,
        &fingerprint.tensor_a,
        &fingerprint.tensor_b,
        &fingerprint.hash_a,
        &fingerprint.hash_b,
        crate::constants::TENSOR_SHAPE_LABEL,
    )?;
    conn.execute(
        "UPDATE tbl_media_objects SET image_tensor_id = ?1 WHERE id = ?2",
        rusqlite::params![tensor_id, media_object_id],
    )?;

    Ok(Outcome::Success { media_object_id })
}

fn process_movie(conn: &mut Connection, config: &Config, file_path: &Path) -> Result<Outcome> {
    let extension = file_path.extension().and_then(|e| e.to_str()).unwrap_or("mp4").to_string();
    let orig_stem = file_path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string();

    // 2. Fingerprint
    let media_hash = hash::compute_movie_hash(file_path)?;

    // 3. Prefilter + 4. Confirm (exact-hash match is itself the confirmation)
    let candidate_count = schema::count_movie_hash_candidates(conn, &media_hash)?;
    if duplicate::movie_is_duplicate(candidate_count) {
        let new_name = duplicate_name(&orig_stem, &orig_stem, None, &extension);
        fs::create_dir_all(&config.duplicate_directory)?;
        fs::rename(file_path, config.duplicate_directory.join(&new_name))?;
        return Ok(Outcome::Duplicate { match_filename: orig_stem, mse: None });
    }

    // 5. Extract metadata
    let movie_meta = ffprobe::probe(file_path).unwrap_or_default();

    // 6. Insert MediaObject
    let media_object_id = schema::insert_media_object(
        conn,
        &NewMediaObject {
            orig_name: orig_stem.clone(),
            media_type: "movie",
            media_create_date: movie_meta.media_create_date.map(|d| d.to_rfc3339()),
            created_by: Some(crate::tools::current_user()),
            created_ip: crate::tools::local_ip(),
            ..Default::default()
        },
    )?;

    // 7. Compute new name
    let date_str = movie_meta.media_create_date.map(|d| d.format("%Y-%m-%d").to_string());
    let new_name = canonical_name(media_object_id, date_str.as_deref(), &extension);

    // 8. Geocode
    let location = match (movie_meta.latitude, movie_meta.longitude) {
        (Some(lat), Some(lon)) => geocode::reverse_geocode(lat, lon, &config.geocoder_user_agent, &config.geocoder_base_url),
        _ => None,
    };

    // 9. Update MediaObject
    schema::update_media_object_location(
        conn,
        media_object_id,
        &LocationUpdate {
            latitude: movie_meta.latitude,
            longitude: movie_meta.longitude,
            class: location.as_ref().and_then(|l| l.class.clone()),
            kind: location.as_ref().and_then(|l| l.kind.clone()),
            name: location.as_ref().and_then(|l| l.name.clone()),
            display_name: location.as_ref().and_then(|l| l.display_name.clone()),
            city: location.as_ref().and_then(|l| l.city.clone()),
            province: location.as_ref().and_then(|l| l.province.clone()),
            country: location.as_ref().and_then(|l| l.country.clone()),
        },
    )?;
    schema::update_media_object_path(conn, media_object_id, &new_name, &config.movies_directory.to_string_lossy())?;

    // 10. Insert metadata rows
    let flattened = flatten_metadata(&movie_meta.raw);
    schema::insert_metadata_rows(conn, media_object_id, &flattened)?;

    // 11. Move file to movies_dir/new_name
    fs::create_dir_all(&config.movies_directory)?;
    fs::rename(file_path, config.movies_directory.join(&new_name))?;

    // 13. Insert movie hash row, link back to MediaObject (no face labeling for movies)
    let hash_id = schema::insert_movie_hash(conn, &new_name, &media_hash)?;
    conn.execute(
        "UPDATE tbl_media_objects SET movie_hash_id = ?1 WHERE id = ?2",
        rusqlite::params![hash_id, media_object_id],
    )?;

    Ok(Outcome::Success { media_object_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_uses_unknown_date_literal_when_date_absent() {
        assert_eq!(canonical_name(42, None, "jpg"), "UnknownDate-0000042.jpg");
    }

    #[test]
    fn canonical_name_zero_pads_to_seven_digits() {
        assert_eq!(canonical_name(7, Some("2023-05-04"), "jpg"), "2023-05-04-0000007.jpg");
    }

    #[test]
    fn duplicate_name_for_images_embeds_mse() {
        let name = duplicate_name("IMG_001", "IMG_999", Some(0.5), "jpg");
        assert_eq!(name, "IMG_001-DUP_OF_IMG_999 (mse-0.5).jpg");
    }

    #[test]
    fn duplicate_name_for_movies_has_no_mse_segment() {
        let name = duplicate_name("CLIP_001", "CLIP_999", None, "mp4");
        assert_eq!(name, "CLIP_001-DUP_OF_CLIP_999.mp4");
    }

    #[test]
    fn duplicate_name_keeps_decimal_for_exact_match() {
        let name = duplicate_name("A", "B", Some(0.0), "jpg");
        assert_eq!(name, "A-DUP_OF_B (mse-0.0).jpg");
    }

    #[test]
    fn duplicate_name_keeps_decimal_for_whole_number_mse() {
        let name = duplicate_name("A", "B", Some(12.0), "jpg");
        assert_eq!(name, "A-DUP_OF_B (mse-12.0).jpg");
    }
}
