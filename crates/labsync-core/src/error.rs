//! Error types for labsync-core

use thiserror::Error;

/// Result type alias using labsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in labsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("Legacy HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Legacy API answered with a non-success status
    #[error("Legacy API error: {0}")]
    Api(String),

    /// Legacy API answered with a body we cannot use
    #[error("Invalid legacy payload: {0}")]
    InvalidPayload(String),

    /// Field mapping document is missing or malformed
    #[error("Invalid field mapping: {0}")]
    Mapping(String),

    /// Connection settings could not be resolved
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a later retry of the same pass can succeed without any change
    /// on our side.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api(_) | Self::InvalidPayload(_))
    }
}
