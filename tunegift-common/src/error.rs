//! Common error types for TuneGift services

use thiserror::Error;

/// Common result type for TuneGift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across TuneGift services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input: malformed quiz, unpaid order, bad request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External provider reported a terminal failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
