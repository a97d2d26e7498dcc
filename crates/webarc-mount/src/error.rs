use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("failed to open archive '{path}': {source}")]
    OpenFailed { path: PathBuf, source: io::Error },

    #[error("archive '{path}' is corrupted or not a ZIP file")]
    Corrupted { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, MountError>;
