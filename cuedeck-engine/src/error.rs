//! Error types for cuedeck-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Lookup failures and invalid transitions are recoverable by
//! design: callers turn them into no-op results, never into panics.

use thiserror::Error;

/// Main error type for cuedeck-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Registry mutation refused (would violate an invariant)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Index out of range or name not found
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// Switch requested that the transition machine cannot honor
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A collaborator (playback, timer, renderer) failed at the boundary
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The engine task is gone (channel closed)
    #[error("Engine unavailable: {0}")]
    EngineGone(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared model/serialization errors
    #[error(transparent)]
    Common(#[from] cuedeck_common::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using cuedeck-engine Error
pub type Result<T> = std::result::Result<T, Error>;
