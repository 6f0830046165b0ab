//! Error types for the SQLite store.

use thiserror::Error;

/// Errors raised by [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connection or statement failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has been closed.
    #[error("Store is closed")]
    Closed,

    /// The database URL is not one this store understands.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

impl From<StoreError> for msm_session::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidUrl(_) => msm_session::Error::Config(e.to_string()),
            other => msm_session::Error::Persistence(other.to_string()),
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
