// Media catalog ingestion engine: library entry point shared by the
// supervisor, worker, and catalogctl binaries.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod duplicate;
pub mod error;
pub mod faces;
pub mod fingerprint;
pub mod format;
pub mod geocode;
pub mod hash;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod supervisor;
pub mod tools;
