//! SHA-256 integrity check for finished downloads

use crate::error::DownloadError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

const READ_CHUNK: usize = 8 * 1024;

/// Compute the SHA-256 of a file as lowercase hex, reading it in chunks
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify that `path` hashes to `expected` (case-insensitive hex)
pub async fn verify_file(path: &Path, expected: &str) -> Result<(), DownloadError> {
    let actual = sha256_file(path).await?;
    debug!("Digest of {}: {}", path.display(), actual);

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
