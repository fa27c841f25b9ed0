//! Unified error handling for qrkit-core

use thiserror::Error;

use crate::services::quota::Plan;

/// Core error type for qrkit-core
///
/// The first group of variants is the user-facing taxonomy: every one of them
/// is recovered locally and leaves the last good state in place. The second
/// group wraps infrastructure failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Nothing to encode: input text is empty")]
    InputEmpty,

    #[error("No composition available to export")]
    NoComposition,

    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Logo could not be decoded: {0}")]
    AssetDecodeFailure(String),

    #[error("Monthly quota exhausted for plan {plan} ({limit} exports)")]
    QuotaExceeded { plan: Plan, limit: u32 },

    #[error("Persisted state unreadable: {0}")]
    PersistenceCorrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for qrkit-core
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an encoding failure
    pub fn encoding(msg: impl Into<String>) -> Self {
        Error::EncodingFailure(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Background task failed: {}", err))
    }
}
