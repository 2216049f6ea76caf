//! Common error types for SortScan

use thiserror::Error;

/// Common result type for SortScan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the repository, settings, report and analysis layers
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-facing input problem; the operation was aborted without state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The persistence delegate refused a write (e.g. quota exceeded)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A stored document could not be parsed
    #[error("Malformed stored data: {0}")]
    MalformedStoredData(String),

    /// The analysis collaborator failed or returned an invalid shape
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::ExternalService(_) | Error::Io(_))
    }
}
