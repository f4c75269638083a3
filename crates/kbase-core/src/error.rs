//! Error types for kbase.

use thiserror::Error;

/// Result type alias using kbase's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kbase operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Missing or unusable credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Acting user is not allowed to touch the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation collides with existing state (duplicate rows)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// True when the error is a Postgres unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
