//! Common error types for Cuedeck

use thiserror::Error;

/// Common result type for Cuedeck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across Cuedeck crates
#[derive(Error, Debug)]
pub enum Error {
    /// Serialization/deserialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}
