// Catalog schema migrations, tracked via PRAGMA user_version (same pattern
// used throughout this codebase's other SQLite-backed stores).

use rusqlite::Connection;

use crate::error::Result;

const MIGRATIONS: &[&str] = &[
    // Migration 1: image tensors, movie hashes, media objects, metadata.
    r#"
    CREATE TABLE IF NOT EXISTS tbl_image_tensors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        tensor_pil BLOB NOT NULL,
        tensor_cv2 BLOB NOT NULL,
        hash_pil TEXT NOT NULL,
        hash_cv2 TEXT NOT NULL,
        tensor_shape TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_image_tensors_hash_pil ON tbl_image_tensors(hash_pil);
    CREATE INDEX IF NOT EXISTS idx_image_tensors_hash_cv2 ON tbl_image_tensors(hash_cv2);

    CREATE TABLE IF NOT EXISTS tbl_movie_hashes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        media_hash TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_movie_hashes_media_hash ON tbl_movie_hashes(media_hash);

    CREATE TABLE IF NOT EXISTS tbl_media_objects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        orig_name TEXT NOT NULL,
        media_type TEXT NOT NULL CHECK (media_type IN ('image','movie')),
        new_name TEXT,
        new_path TEXT,
        media_create_date TEXT,
        latitude REAL,
        longitude REAL,
        location_class TEXT,
        location_type TEXT,
        location_name TEXT,
        location_display_name TEXT,
        location_city TEXT,
        location_province TEXT,
        location_country TEXT,
        image_tensor_id INTEGER REFERENCES tbl_image_tensors(id),
        movie_hash_id INTEGER REFERENCES tbl_movie_hashes(id),
        width INTEGER,
        height INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_by TEXT,
        created_ip TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_media_objects_type ON tbl_media_objects(media_type);

    CREATE TABLE IF NOT EXISTS tbl_media_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        media_object_id INTEGER NOT NULL REFERENCES tbl_media_objects(id),
        exif_tag TEXT NOT NULL,
        exif_data TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_media_metadata_object ON tbl_media_metadata(media_object_id);
    "#,
    // Migration 2: known/identified/invalid faces and the tag catalog.
    r#"
    CREATE TABLE IF NOT EXISTS tbl_known_faces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        encoding BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tbl_identified_faces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        media_object_id INTEGER NOT NULL REFERENCES tbl_media_objects(id),
        face_name TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_identified_faces_object ON tbl_identified_faces(media_object_id);

    CREATE TABLE IF NOT EXISTS tbl_invalid_faces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        media_object_id INTEGER NOT NULL REFERENCES tbl_media_objects(id),
        top INTEGER NOT NULL,
        right INTEGER NOT NULL,
        bottom INTEGER NOT NULL,
        left INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_invalid_faces_object ON tbl_invalid_faces(media_object_id);

    CREATE TABLE IF NOT EXISTS tbl_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS tbl_tag_to_media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        media_object_id INTEGER NOT NULL REFERENCES tbl_media_objects(id),
        tag_id INTEGER NOT NULL REFERENCES tbl_tags(id),
        UNIQUE (media_object_id, tag_id)
    );
    "#,
    // Migration 3: job run audit trail.
    r#"
    CREATE TABLE IF NOT EXISTS tbl_job_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        media_type TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        outcome TEXT CHECK (outcome IN ('success','duplicate','error')),
        media_object_id INTEGER,
        error_message TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_job_runs_started ON tbl_job_runs(started_at);
    "#,
];

fn schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Runs every migration newer than the database's current `user_version`.
/// Safe to call on every startup.
pub fn run(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    let target = MIGRATIONS.len() as i64;

    if current > target {
        return Err(crate::error::CatalogIngestError::Catalog(format!(
            "catalog schema version {current} is newer than this build supports (max {target})"
        )));
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
        log::info!("applied catalog migration {version}");
    }

    Ok(())
}
