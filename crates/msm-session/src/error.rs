//! Error types for session registry operations.

use crate::codec::CodecError;

/// Error type for session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid registry or backing-store configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store failed to read, write or delete.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Stored session data could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A caller passed an absent key.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The inbound request carried an unreadable session id.
    #[error("Invalid request: {0}")]
    Request(String),
}

/// Result type for session registry operations.
pub type Result<T> = std::result::Result<T, Error>;
