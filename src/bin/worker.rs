// Worker entry point (C11). One process handles exactly one file, declared
// via `NEW_FILE=<path>,<image|movie>` in the environment, and exits with a
// non-zero status on failure so the supervisor's reap step can react.

use std::path::PathBuf;

use mediacatalog::config::Config;
use mediacatalog::faces::ExternalFaceModel;
use mediacatalog::pipeline::{self, MediaType};

fn parse_new_file(raw: &str) -> Option<(PathBuf, MediaType)> {
    let (path, kind) = raw.rsplit_once(',')?;
    let media_type = match kind.trim() {
        "image" => MediaType::Image,
        "movie" => MediaType::Movie,
        _ => return None,
    };
    Some((PathBuf::from(path.trim()), media_type))
}

fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("worker: configuration error: {e}");
            std::process::exit(2);
        }
    };
    mediacatalog::logging::init(&config);

    let raw = match std::env::var("NEW_FILE") {
        Ok(v) => v,
        Err(_) => {
            log::error!("worker: NEW_FILE is not set");
            std::process::exit(2);
        }
    };

    let (path, media_type) = match parse_new_file(&raw) {
        Some(pair) => pair,
        None => {
            log::error!("worker: malformed NEW_FILE value: {raw}");
            std::process::exit(2);
        }
    };

    let mut conn = match mediacatalog::catalog::open_connection(&config.catalog_db_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("worker: failed to open catalog: {e}");
            std::process::exit(1);
        }
    };

    let model = ExternalFaceModel::resolve();

    log::info!("worker: processing {} as {:?}", path.display(), media_type);
    match pipeline::run(&mut conn, &config, &model, &path, media_type) {
        Ok(outcome) => {
            log::info!("worker: finished {}: {:?}", path.display(), outcome);
            std::process::exit(0);
        }
        Err(e) => {
            log::error!("worker: failed on {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}
