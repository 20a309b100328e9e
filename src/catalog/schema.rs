// Typed catalog queries. Functions take a borrowed `Connection` (pulled from
// the pool by the caller) rather than the pool itself, so callers control
// transaction boundaries.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};

use crate::constants::KNOWN_FACE_ENCODING_LEN;
use crate::duplicate::CandidateImage;
use crate::error::{CatalogIngestError, Result};
use crate::metadata::FlatValue;

#[derive(Debug, Clone, Default)]
pub struct NewMediaObject {
    pub orig_name: String,
    pub media_type: &'static str,
    pub image_tensor_id: Option<i64>,
    pub movie_hash_id: Option<i64>,
    pub media_create_date: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_by: Option<String>,
    pub created_ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MediaObject {
    pub id: i64,
    pub orig_name: String,
    pub media_type: String,
    pub new_name: Option<String>,
    pub new_path: Option<String>,
    pub media_create_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_ip: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationUpdate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub class: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: i64,
    pub file_path: String,
    pub media_type: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub outcome: Option<String>,
    pub media_object_id: Option<i64>,
    pub error_message: Option<String>,
}

// ----- image tensors / movie hashes -----

pub fn insert_image_tensor(
    conn: &Connection,
    filename: &str,
    tensor_pil: &[u8],
    tensor_cv2: &[u8],
    hash_pil: &str,
    hash_cv2: &str,
    tensor_shape: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO tbl_image_tensors (filename, tensor_pil, tensor_cv2, hash_pil, hash_cv2, tensor_shape)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![filename, tensor_pil, tensor_cv2, hash_pil, hash_cv2, tensor_shape],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Prefilter: every tensor row whose PIL or CV2 hash matches the incoming
/// file's corresponding hash. The rotation-MSE confirmation pass in
/// `duplicate.rs` narrows this list further.
pub fn fetch_tensor_candidates_by_hash(conn: &Connection, hash_a: &str, hash_b: &str) -> Result<Vec<CandidateImage>> {
    let mut stmt = conn.prepare(
        "SELECT filename, tensor_pil, tensor_cv2 FROM tbl_image_tensors WHERE hash_pil = ?1 OR hash_cv2 = ?2",
    )?;
    let rows = stmt
        .query_map(params![hash_a, hash_b], |row| {
            Ok(CandidateImage {
                filename: row.get(0)?,
                tensor_pil: row.get(1)?,
                tensor_cv2: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_movie_hash(conn: &Connection, filename: &str, media_hash: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO tbl_movie_hashes (filename, media_hash) VALUES (?1, ?2)",
        params![filename, media_hash],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_movie_hash_candidates(conn: &Connection, media_hash: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tbl_movie_hashes WHERE media_hash = ?1",
        params![media_hash],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

// ----- media objects -----

pub fn insert_media_object(conn: &Connection, media: &NewMediaObject) -> Result<i64> {
    conn.execute(
        "INSERT INTO tbl_media_objects (orig_name, media_type, image_tensor_id, movie_hash_id, media_create_date, width, height, created_by, created_ip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            media.orig_name,
            media.media_type,
            media.image_tensor_id,
            media.movie_hash_id,
            media.media_create_date,
            media.width,
            media.height,
            media.created_by,
            media.created_ip,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_media_object_path(conn: &Connection, id: i64, new_name: &str, new_path: &str) -> Result<()> {
    conn.execute(
        "UPDATE tbl_media_objects SET new_name = ?1, new_path = ?2 WHERE id = ?3",
        params![new_name, new_path, id],
    )?;
    Ok(())
}

pub fn update_media_object_location(conn: &Connection, id: i64, location: &LocationUpdate) -> Result<()> {
    conn.execute(
        "UPDATE tbl_media_objects SET
            latitude = ?1, longitude = ?2, location_class = ?3, location_type = ?4,
            location_name = ?5, location_display_name = ?6, location_city = ?7,
            location_province = ?8, location_country = ?9
         WHERE id = ?10",
        params![
            location.latitude,
            location.longitude,
            location.class,
            location.kind,
            location.name,
            location.display_name,
            location.city,
            location.province,
            location.country,
            id,
        ],
    )?;
    Ok(())
}

pub fn get_media_object(conn: &Connection, id: i64) -> Result<Option<MediaObject>> {
    conn.query_row(
        "SELECT id, orig_name, media_type, new_name, new_path, media_create_date, latitude, longitude,
                location_city, location_country, is_active, created_by, created_ip
         FROM tbl_media_objects WHERE id = ?1",
        params![id],
        |row| {
            Ok(MediaObject {
                id: row.get(0)?,
                orig_name: row.get(1)?,
                media_type: row.get(2)?,
                new_name: row.get(3)?,
                new_path: row.get(4)?,
                media_create_date: row.get(5)?,
                latitude: row.get(6)?,
                longitude: row.get(7)?,
                location_city: row.get(8)?,
                location_country: row.get(9)?,
                is_active: row.get(10)?,
                created_by: row.get(11)?,
                created_ip: row.get(12)?,
            })
        },
    )
    .optional()
    .map_err(CatalogIngestError::from)
}

// ----- metadata -----

pub fn insert_metadata_rows(conn: &Connection, media_object_id: i64, flattened: &BTreeMap<String, FlatValue>) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO tbl_media_metadata (media_object_id, exif_tag, exif_data) VALUES (?1, ?2, ?3)",
    )?;
    for (tag, value) in flattened {
        stmt.execute(params![media_object_id, tag, value.to_storage_string()])?;
    }
    Ok(())
}

// ----- faces -----

fn encode_embedding(encoding: &[f64; KNOWN_FACE_ENCODING_LEN]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(KNOWN_FACE_ENCODING_LEN * 8);
    for value in encoding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> Option<[f64; KNOWN_FACE_ENCODING_LEN]> {
    if bytes.len() != KNOWN_FACE_ENCODING_LEN * 8 {
        return None;
    }
    let mut out = [0f64; KNOWN_FACE_ENCODING_LEN];
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        out[i] = f64::from_le_bytes(chunk.try_into().ok()?);
    }
    Some(out)
}

pub fn load_known_faces(conn: &Connection) -> Result<Vec<(String, [f64; KNOWN_FACE_ENCODING_LEN])>> {
    let mut stmt = conn.prepare("SELECT name, encoding FROM tbl_known_faces ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(0)?;
        let raw: Vec<u8> = row.get(1)?;
        Ok((name, raw))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (name, raw) = row?;
        match decode_embedding(&raw) {
            Some(encoding) => out.push((name, encoding)),
            None => log::error!("known face '{name}' has a malformed encoding, skipping"),
        }
    }
    Ok(out)
}

pub fn add_known_face(conn: &Connection, name: &str, encoding: &[f64; KNOWN_FACE_ENCODING_LEN]) -> Result<()> {
    conn.execute(
        "INSERT INTO tbl_known_faces (name, encoding) VALUES (?1, ?2)",
        params![name, encode_embedding(encoding)],
    )?;
    Ok(())
}

/// Deletes every previously-identified face for `media_object_id`, drops the
/// `TagToMedia` links those prior names had created, inserts the
/// freshly-identified set, and upserts/links a tag for each new name — all
/// as a single transaction.
pub fn rewrite_identified_faces(conn: &mut Connection, media_object_id: i64, names: &[String]) -> Result<()> {
    let tx = conn.transaction()?;

    let prior_names: Vec<String> = {
        let mut stmt = tx.prepare("SELECT DISTINCT face_name FROM tbl_identified_faces WHERE media_object_id = ?1")?;
        let rows = stmt.query_map(params![media_object_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    tx.execute(
        "DELETE FROM tbl_identified_faces WHERE media_object_id = ?1",
        params![media_object_id],
    )?;

    for prior_name in &prior_names {
        tx.execute(
            "DELETE FROM tbl_tag_to_media WHERE media_object_id = ?1
             AND tag_id IN (SELECT id FROM tbl_tags WHERE name = ?2)",
            params![media_object_id, prior_name],
        )?;
    }

    for name in names {
        tx.execute(
            "INSERT INTO tbl_identified_faces (media_object_id, face_name) VALUES (?1, ?2)",
            params![media_object_id, name],
        )?;
        let tag_id = lookup_or_create_tag(&tx, name)?;
        link_tag_to_media(&tx, media_object_id, tag_id)?;
    }

    tx.commit()?;
    Ok(())
}

pub fn insert_invalid_face(conn: &Connection, media_object_id: i64, top: i64, right: i64, bottom: i64, left: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO tbl_invalid_faces (media_object_id, top, right, bottom, left) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![media_object_id, top, right, bottom, left],
    )?;
    Ok(())
}

pub fn is_invalid_face_location(conn: &Connection, media_object_id: i64, top: i64, right: i64, bottom: i64, left: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tbl_invalid_faces
         WHERE media_object_id = ?1 AND top = ?2 AND right = ?3 AND bottom = ?4 AND left = ?5",
        params![media_object_id, top, right, bottom, left],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ----- tags -----

pub fn lookup_or_create_tag(conn: &Connection, name: &str) -> Result<i64> {
    if let Some(id) = conn
        .query_row("SELECT id FROM tbl_tags WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?
    {
        return Ok(id);
    }
    conn.execute("INSERT INTO tbl_tags (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn link_tag_to_media(conn: &Connection, media_object_id: i64, tag_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO tbl_tag_to_media (media_object_id, tag_id) VALUES (?1, ?2)",
        params![media_object_id, tag_id],
    )?;
    Ok(())
}

// ----- job runs -----

pub fn start_job_run(conn: &Connection, file_path: &str, media_type: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO tbl_job_runs (file_path, media_type, started_at) VALUES (?1, ?2, datetime('now'))",
        params![file_path, media_type],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_job_run(conn: &Connection, id: i64, outcome: &str, media_object_id: Option<i64>, error_message: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE tbl_job_runs SET finished_at = datetime('now'), outcome = ?1, media_object_id = ?2, error_message = ?3 WHERE id = ?4",
        params![outcome, media_object_id, error_message, id],
    )?;
    Ok(())
}

pub fn recent_job_runs(conn: &Connection, limit: u32) -> Result<Vec<JobRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_path, media_type, started_at, finished_at, outcome, media_object_id, error_message
         FROM tbl_job_runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(JobRun {
                id: row.get(0)?,
                file_path: row.get(1)?,
                media_type: row.get(2)?,
                started_at: row.get(3)?,
                finished_at: row.get(4)?,
                outcome: row.get(5)?,
                media_object_id: row.get(6)?,
                error_message: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run(&conn).unwrap();
        conn
    }

    #[test]
    fn tensor_candidates_match_on_either_hash() {
        let conn = conn();
        insert_image_tensor(&conn, "a.jpg", b"pil", b"cv2", "hashA", "hashB", "(50, 50, 3)").unwrap();
        let by_a = fetch_tensor_candidates_by_hash(&conn, "hashA", "nomatch").unwrap();
        let by_b = fetch_tensor_candidates_by_hash(&conn, "nomatch", "hashB").unwrap();
        assert_eq!(by_a.len(), 1);
        assert_eq!(by_b.len(), 1);
    }

    #[test]
    fn movie_hash_candidate_count_is_exact() {
        let conn = conn();
        insert_movie_hash(&conn, "clip.mp4", "deadbeef").unwrap();
        assert_eq!(count_movie_hash_candidates(&conn, "deadbeef").unwrap(), 1);
        assert_eq!(count_movie_hash_candidates(&conn, "other").unwrap(), 0);
    }

    #[test]
    fn known_face_roundtrips_through_blob_encoding() {
        let conn = conn();
        let mut encoding = [0f64; KNOWN_FACE_ENCODING_LEN];
        encoding[0] = 0.125;
        encoding[127] = -3.5;
        add_known_face(&conn, "Alice", &encoding).unwrap();
        let loaded = load_known_faces(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "Alice");
        assert_eq!(loaded[0].1, encoding);
    }

    #[test]
    fn rewrite_identified_faces_replaces_prior_set() {
        let mut conn = conn();
        let media = insert_media_object(
            &conn,
            &NewMediaObject {
                orig_name: "a.jpg".into(),
                media_type: "image",
                ..Default::default()
            },
        )
        .unwrap();
        rewrite_identified_faces(&mut conn, media, &["Alice".into(), "Bob".into()]).unwrap();
        rewrite_identified_faces(&mut conn, media, &["Carol".into()]).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tbl_identified_faces WHERE media_object_id = ?1",
                params![media],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Alice/Bob's tag links are dropped along with their identification;
        // Carol's tag is upserted and linked in the same call.
        let alice_links: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tbl_tag_to_media tm JOIN tbl_tags t ON t.id = tm.tag_id
                 WHERE tm.media_object_id = ?1 AND t.name = 'Alice'",
                params![media],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(alice_links, 0);

        let carol_links: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tbl_tag_to_media tm JOIN tbl_tags t ON t.id = tm.tag_id
                 WHERE tm.media_object_id = ?1 AND t.name = 'Carol'",
                params![media],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(carol_links, 1);
    }

    #[test]
    fn lookup_or_create_tag_is_idempotent() {
        let conn = conn();
        let a = lookup_or_create_tag(&conn, "family").unwrap();
        let b = lookup_or_create_tag(&conn, "family").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn job_run_lifecycle() {
        let conn = conn();
        let id = start_job_run(&conn, "/tmp/a.jpg", "image").unwrap();
        finish_job_run(&conn, id, "success", Some(1), None).unwrap();
        let runs = recent_job_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome.as_deref(), Some("success"));
    }
}
