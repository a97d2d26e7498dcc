use std::fmt;

/// Why one source in the ordered attempt list failed. Accumulated, not
/// thrown, so total failure can report every attempt.
#[derive(Clone, Debug)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no game data record with id {0}")]
    UnknownRecord(i64),

    #[error("game data {asset_id} is already present on disk")]
    AlreadyPresent { asset_id: String },

    #[error("a download for {asset_id} is already in progress")]
    AlreadyActive { asset_id: String },

    #[error("no download sources configured")]
    NoSources,

    #[error("all sources failed for {asset_id}: [{}]", format_failures(failures))]
    AllSourcesFailed {
        asset_id: String,
        failures: Vec<SourceFailure>,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("content directory '{content_dir}' is not inside installation root '{root}'")]
    ContentDirOutsideRoot {
        content_dir: std::path::PathBuf,
        root: std::path::PathBuf,
    },

    #[error(transparent)]
    Place(#[from] webarc_fs::FsError),

    #[error(transparent)]
    Store(#[from] webarc_store::StoreError),
}

fn format_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, FetchError>;
