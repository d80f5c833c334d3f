//! Errors produced at the component boundaries. None of them ever reaches the
//! playback store: the poller turns a [`ProbeError`] into a fallthrough and the
//! lyrics engine turns a [`LyricsError`] into an empty lyric sequence.

/// Why a single source could not produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("application is not running")]
    NotRunning,

    #[error("player is stopped")]
    Stopped,

    /// The application answered, but not with anything describing media.
    #[error("no media document")]
    NoDocument,

    #[error("script execution failed: {0}")]
    ExecutionError(String),

    #[error("probe timed out")]
    Timeout,

    #[error("command {0} is not supported by this source")]
    Unsupported(&'static str),
}

/// Failure talking to the timed lyrics service.
#[derive(Debug, thiserror::Error)]
pub enum LyricsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lyrics service answered with status {0}")]
    Status(u16),

    #[error("lyrics request timed out")]
    Timeout,

    #[error("invalid lyrics response: {0}")]
    Decode(String),
}

impl LyricsError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LyricsError::Timeout
        } else if err.is_decode() {
            LyricsError::Decode(err.to_string())
        } else {
            LyricsError::Http(err)
        }
    }
}
