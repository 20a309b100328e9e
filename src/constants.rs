// Catalog ingestion constants. These values mirror the operational defaults
// the ingestion engine ships with; per-deployment overrides live in config.rs.

pub const MOVIE_HASH_CHUNK_SIZE: usize = 8192; // 8 KiB, per movie fingerprinter contract

// Tensor fingerprint shape
pub const TENSOR_WIDTH: u32 = 50;
pub const TENSOR_HEIGHT: u32 = 50;
pub const TENSOR_CHANNELS: usize = 3;
pub const TENSOR_BYTE_LEN: usize = (TENSOR_WIDTH as usize) * (TENSOR_HEIGHT as usize) * TENSOR_CHANNELS;
pub const TENSOR_SHAPE_LABEL: &str = "(50, 50, 3)";

// Duplicate matcher defaults
pub const DEFAULT_MSE_THRESHOLD: f64 = 0.0;
pub const DUPLICATE_COMPARE_POOL_SIZE: usize = 10;

// Supervisor defaults
pub const DEFAULT_MAX_CONTAINERS: usize = 13;
pub const SUPERVISOR_INNER_POLL_SECONDS: u64 = 1;
pub const SUPERVISOR_OUTER_RESCAN_SECONDS: u64 = 5;
pub const REAP_TIMEOUT_SECONDS: u64 = 120;
pub const REAP_MAX_RETRIES: u32 = 3;

// Geocoder
pub const GEOCODE_RETRIES: u32 = 3;
pub const GEOCODE_RETRY_DELAY_SECONDS: u64 = 5;
pub const GEOCODE_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "mediacatalog-ingest";
pub const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

// Extension allowlists
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 8] = [
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "heic", "heif",
];
pub const DEFAULT_MOVIE_EXTENSIONS: [&str; 6] = ["mp4", "mov", "avi", "mkv", "m4v", "wmv"];

// Catalog schema
pub const KNOWN_FACE_ENCODING_LEN: usize = 128;
