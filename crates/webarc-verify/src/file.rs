use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{Result, VerifyError};
use crate::hasher::{Hasher, Sha256Hasher};

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams a file through SHA-256 without buffering it whole.
pub struct HashVerifier;

impl HashVerifier {
    /// Compute the lowercase hex SHA-256 of a file.
    pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
        let mut file = File::open(path.as_ref()).await?;
        let mut hasher = Sha256Hasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize_hex())
    }

    /// Case-insensitive comparison against an expected hex digest.
    pub async fn matches(path: impl AsRef<Path>, expected_hex: &str) -> Result<bool> {
        let actual = Self::hash_file(path).await?;
        Ok(actual.eq_ignore_ascii_case(expected_hex))
    }

    /// Verify a file against an expected digest, naming the source that
    /// produced the bytes in the error on mismatch.
    pub async fn verify(
        path: impl AsRef<Path>,
        expected_hex: &str,
        source_name: &str,
    ) -> Result<()> {
        let actual = Self::hash_file(path).await?;
        if actual.eq_ignore_ascii_case(expected_hex) {
            Ok(())
        } else {
            Err(VerifyError::Mismatch {
                source_name: source_name.to_string(),
                expected: expected_hex.to_ascii_lowercase(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn hash_file_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let digest = HashVerifier::hash_file(&path).await.unwrap();
        assert_eq!(digest, HELLO_SHA256);
    }

    #[tokio::test]
    async fn matches_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();

        assert!(
            HashVerifier::matches(&path, &HELLO_SHA256.to_ascii_uppercase())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn verify_embeds_source_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let err = HashVerifier::verify(&path, &"0".repeat(64), "mirror-a")
            .await
            .unwrap_err();
        match err {
            VerifyError::Mismatch { source_name, actual, .. } => {
                assert_eq!(source_name, "mirror-a");
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }
}
