//! Content fingerprinting
//!
//! SHA-256 over the full file content, lowercase hex. The digest is the sole
//! deduplication criterion: identical bytes always produce the same
//! fingerprint regardless of name, location or arrival time.

use claimsync_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Fingerprint an in-memory buffer
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint a file by streaming it in 1MB chunks on the blocking pool
pub async fn fingerprint_file(path: &Path) -> Result<String> {
    let path_buf = path.to_path_buf();

    let hash = tokio::task::spawn_blocking(move || -> Result<String> {
        use std::fs::File;
        use std::io::Read;

        let mut file = File::open(&path_buf).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {} for hashing: {}", path_buf.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Internal(format!("Hash calculation task failed: {}", e)))??;

    tracing::debug!(path = %path.display(), content_hash = %hash, "Calculated hash");

    Ok(hash)
}
