use webarc_cgi::CgiError;
use webarc_fetch::FetchError;
use webarc_store::StoreError;

pub type Result<T> = std::result::Result<T, ServeError>;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// No tier produced content. Terminal; maps to 404.
    #[error("no content found for {key}")]
    NotFound { key: String },

    #[error("game {0} is unknown to the catalog")]
    UnknownGame(String),

    /// Another pathway is already downloading this asset.
    #[error("a download for {0} is already in progress")]
    DownloadInFlight(String),

    #[error("game {game_id} is marked present but has no recorded path")]
    MissingRecordedPath { game_id: String },

    #[error(transparent)]
    Cgi(#[from] CgiError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mount(#[from] webarc_mount::MountError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
