// Process configuration (SPEC_FULL.md S10.2). Loaded once at startup from
// environment variables; a missing required path is a fatal startup error,
// never deferred into the pipeline.

use std::path::PathBuf;

use crate::constants::{
    DEFAULT_GEOCODER_BASE_URL, DEFAULT_GEOCODER_USER_AGENT, DEFAULT_IMAGE_EXTENSIONS,
    DEFAULT_MAX_CONTAINERS, DEFAULT_MOVIE_EXTENSIONS, DEFAULT_MSE_THRESHOLD,
};
use crate::error::{CatalogIngestError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub files_to_process_directory: PathBuf,
    pub image_directory: PathBuf,
    pub movies_directory: PathBuf,
    pub duplicate_directory: PathBuf,
    pub error_directory: PathBuf,
    pub log_directory: Option<PathBuf>,

    pub image_extensions: Vec<String>,
    pub movie_extensions: Vec<String>,

    pub mse_threshold: f64,
    pub max_containers: usize,

    pub catalog_db_path: PathBuf,

    pub geocoder_user_agent: String,
    pub geocoder_base_url: String,

    pub file_debug_level: String,
    pub console_debug_level: String,
}

fn required_path(key: &str) -> Result<PathBuf> {
    std::env::var(key)
        .map(PathBuf::from)
        .map_err(|_| CatalogIngestError::Other(format!("{key} is required but not set")))
}

fn optional_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list_or(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_f64_or(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize_or(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from the process environment. Fails fast if any
    /// of the four required intake/output directories is unset.
    pub fn from_env() -> Result<Config> {
        Ok(Config {
            files_to_process_directory: required_path("FILES_TO_PROCESS_DIRECTORY")?,
            image_directory: required_path("IMAGE_DIRECTORY")?,
            movies_directory: required_path("MOVIES_DIRECTORY")?,
            duplicate_directory: required_path("DUPLICATE_DIRECTORY")?,
            error_directory: required_path("ERROR_DIRECTORY")?,
            log_directory: optional_path("LOG_DIRECTORY"),

            image_extensions: env_list_or("IMAGE_EXTENSIONS", &DEFAULT_IMAGE_EXTENSIONS),
            movie_extensions: env_list_or("MOVIE_EXTENSIONS", &DEFAULT_MOVIE_EXTENSIONS),

            mse_threshold: env_f64_or("MSE_THRESHOLD", DEFAULT_MSE_THRESHOLD),
            max_containers: env_usize_or("MAX_CONTAINERS", DEFAULT_MAX_CONTAINERS),

            catalog_db_path: required_path("CATALOG_DB_PATH")?,

            geocoder_user_agent: env_or("GEOCODER_USER_AGENT", DEFAULT_GEOCODER_USER_AGENT),
            geocoder_base_url: env_or("GEOCODER_BASE_URL", DEFAULT_GEOCODER_BASE_URL),

            file_debug_level: env_or("FILE_DEBUG_LEVEL", "info"),
            console_debug_level: env_or("CONSOLE_DEBUG_LEVEL", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_required() {
        for key in [
            "FILES_TO_PROCESS_DIRECTORY",
            "IMAGE_DIRECTORY",
            "MOVIES_DIRECTORY",
            "DUPLICATE_DIRECTORY",
            "ERROR_DIRECTORY",
            "CATALOG_DB_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_directory_is_a_fatal_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_required();
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn loads_defaults_when_optional_keys_are_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_required();
        std::env::set_var("FILES_TO_PROCESS_DIRECTORY", "/tmp/intake");
        std::env::set_var("IMAGE_DIRECTORY", "/tmp/images");
        std::env::set_var("MOVIES_DIRECTORY", "/tmp/movies");
        std::env::set_var("DUPLICATE_DIRECTORY", "/tmp/dupes");
        std::env::set_var("ERROR_DIRECTORY", "/tmp/errors");
        std::env::set_var("CATALOG_DB_PATH", "/tmp/catalog.db");

        let config = Config::from_env().unwrap();
        assert_eq!(config.max_containers, DEFAULT_MAX_CONTAINERS);
        assert_eq!(config.mse_threshold, DEFAULT_MSE_THRESHOLD);
        assert!(config.image_extensions.contains(&"jpg".to_string()));
        clear_required();
    }

    #[test]
    fn extension_list_is_lowercased_and_dotless() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_required();
        std::env::set_var("FILES_TO_PROCESS_DIRECTORY", "/tmp/intake");
        std::env::set_var("IMAGE_DIRECTORY", "/tmp/images");
        std::env::set_var("MOVIES_DIRECTORY", "/tmp/movies");
        std::env::set_var("DUPLICATE_DIRECTORY", "/tmp/dupes");
        std::env::set_var("ERROR_DIRECTORY", "/tmp/errors");
        std::env::set_var("CATALOG_DB_PATH", "/tmp/catalog.db");
        std::env::set_var("IMAGE_EXTENSIONS", ".JPG, .PNG");

        let config = Config::from_env().unwrap();
        assert_eq!(config.image_extensions, vec!["jpg", "png"]);
        clear_required();
        std::env::remove_var("IMAGE_EXTENSIONS");
    }
}
