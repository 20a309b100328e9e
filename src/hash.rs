// MD5 content hashing for movie fingerprints and image tensor fingerprints.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::constants::MOVIE_HASH_CHUNK_SIZE;
use crate::error::{CatalogIngestError, Result};

/// Streams the file in 8 KiB chunks through MD5 and returns the lowercase hex digest.
/// No content parsing — used as the movie fingerprinter (C4).
pub fn compute_movie_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| CatalogIngestError::Fingerprint(format!("failed to open {}: {}", path.display(), e)))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; MOVIE_HASH_CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| CatalogIngestError::Fingerprint(format!("failed to read {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex_digest(hasher))
}

/// MD5 over a flat tensor byte buffer, 32-char lowercase hex. Used by the
/// image fingerprinter (C3) over both decoder outputs.
pub fn compute_tensor_hash(tensor: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(tensor);
    hex_digest(hasher)
}

fn hex_digest(hasher: Md5) -> String {
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn movie_hash_matches_known_md5() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();

        let hash = compute_movie_hash(file.path()).unwrap();
        assert_eq!(hash, "65a8e27d8879283831b664bd8b7f0ad4");
    }

    #[test]
    fn tensor_hash_is_32_char_lowercase_hex() {
        let tensor = vec![0u8; 7500];
        let hash = compute_tensor_hash(&tensor);
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_buffer_hashes_to_md5_of_empty_string() {
        let hash = compute_tensor_hash(&[]);
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
    }
}
