#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no game data record with id {0}")]
    NotFound(i64),

    #[error("stored path rejected: {0}")]
    InvalidPath(#[from] webarc_fs::FsError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
