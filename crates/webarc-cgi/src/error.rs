use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CgiError {
    #[error("script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("script '{path}' resolves outside the allowed roots")]
    OutsideRoots { path: PathBuf },

    #[error("script execution timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("interpreter terminated by signal {0}")]
    KilledBySignal(i32),

    #[error("script output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("failed to spawn interpreter '{interpreter}': {source}")]
    SpawnFailed {
        interpreter: PathBuf,
        source: io::Error,
    },

    #[error("child process stream missing")]
    StreamMissing,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CgiError>;
