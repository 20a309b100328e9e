// Catalog ingestion error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogIngestError {
    #[error("format error: {0}")]
    Format(String),

    #[error("fingerprint error: {0}")]
    Fingerprint(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("geocode error: {0}")]
    Geocode(String),

    #[error("isolation error: {0}")]
    Isolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CatalogIngestError {
    fn from(err: anyhow::Error) -> Self {
        CatalogIngestError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogIngestError>;
