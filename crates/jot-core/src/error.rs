//! Error types for jot-core

use thiserror::Error;

/// Result type alias using jot-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jot-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local storage failure. Fatal to the calling operation and surfaced
    /// to the caller; never absorbed into the retry queue.
    #[error("local write failed: {0}")]
    LocalWrite(String),

    /// Network or HTTP failure talking to the sync service. Recovered by
    /// queue-and-retry wherever a local-first path exists.
    #[error("remote request failed: {0}")]
    Remote(String),

    /// Token refresh failed; the stored credentials are no longer valid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The requested record does not exist (locally, or remote HTTP 404).
    #[error("note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        Self::LocalWrite(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Remote(error.to_string())
    }
}
