use std::io;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("hash mismatch from {source_name}: expected {expected}, got {actual}")]
    Mismatch {
        source_name: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
