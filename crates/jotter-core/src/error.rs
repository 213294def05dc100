//! Error types for jotter-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using jotter-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in local (authoritative) operations.
///
/// These surface to the immediate caller: a failed local write means the
/// note was not saved.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for remote document store operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors raised by a remote document store.
///
/// The sync coordinator records these and never propagates them.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Remote store is misconfigured
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),

    /// Transport failure
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an error status
    #[error("Remote API error: {0}")]
    Api(String),

    /// The remote call did not finish in time
    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    /// The remote returned something we could not decode
    #[error("Invalid remote payload: {0}")]
    Payload(String),
}

/// A remote record that could not be turned into a local note.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFault {
    /// Document has no id field
    #[error("document has no id")]
    MissingId,

    /// Document id is not a positive integer
    #[error("document id {0:?} is not a valid local note id")]
    InvalidId(String),

    /// Color tag does not fit the local column
    #[error("color {0} is out of range")]
    ColorOutOfRange(i64),
}
