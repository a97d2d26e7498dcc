//! Content verification primitives for downloaded game assets.
//!
//! Streaming SHA-256 with a boolean check and a verify-or-fail variant
//! that attributes the mismatch to the source that produced the bytes.

mod error;
mod file;
mod hasher;

pub use error::{Result, VerifyError};
pub use file::HashVerifier;
pub use hasher::{Hasher, Sha256Hasher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hasher_known_vector() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"hello world");
        let hash = hasher.finalize();
        let expected =
            hex::decode("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn one_shot_digest_matches_incremental() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"abc");
        hasher.update(b"def");
        assert_eq!(hasher.finalize(), Sha256Hasher::digest(b"abcdef"));
    }
}
