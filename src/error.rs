use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetlistError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Failed to authenticate")]
    FailedToAuthenticate,

    #[error("Invalid expiry")]
    InvalidExpiry,

    #[error("{context} failed: {status} => {body}")]
    Api {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("rate_limited: retry_after={retry_after:?}")]
    RateLimited { retry_after: Option<u64> },

    #[error("authorization callback rejected: {0}")]
    Callback(String),

    #[error("invalid track index {index} for playlist of {len} tracks")]
    InvalidTrackIndex { index: usize, len: usize },

    #[error("{0} track(s) are local files or have no URI and cannot be re-added")]
    UnmovableTracks(usize),

    #[error("invalid cover art: {0}")]
    InvalidCoverArt(String),

    #[error("response missing {0}")]
    MissingField(&'static str),

    #[error("no playlist loaded")]
    NoPlaylist,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SetlistError>;
