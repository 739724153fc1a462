use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const BUF_SIZE: usize = 64 * 1024;

/// Streams a file through SHA-256 without holding it in memory.
pub struct Verifier;

impl Verifier {
    /// Lowercase hex SHA-256 of the file
    pub async fn digest<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
        let mut file = fs::File::open(path.as_ref()).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUF_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn matches(expected: &str, actual: &str) -> bool {
        expected.trim().eq_ignore_ascii_case(actual.trim())
    }

    /// Returns `Ok(Ok(digest))` on match, `Ok(Err(digest))` on mismatch.
    pub async fn verify<P: AsRef<Path>>(
        path: P,
        expected: &str,
    ) -> std::io::Result<std::result::Result<String, String>> {
        let path = path.as_ref();
        info!("Verifying: {}", path.display());
        let actual = Self::digest(path).await?;
        debug!("Computed sha256 {} (expected {})", actual, expected);

        if Self::matches(expected, &actual) {
            info!("Verifying: OK");
            Ok(Ok(actual))
        } else {
            warn!("Verifying: mismatch {} <-> {}", actual, expected);
            Ok(Err(actual))
        }
    }
}
