use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("path '{path}' escapes base directory '{base}'")]
    PathEscape { path: PathBuf, base: PathBuf },

    #[error("path '{0}' is absolute where a relative path is required")]
    AbsolutePath(PathBuf),

    #[error("not enough disk space to place '{path}'")]
    DiskFull { path: PathBuf, source: io::Error },

    #[error("permission denied placing '{path}'")]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("failed to place '{path}': {source}")]
    Place { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
