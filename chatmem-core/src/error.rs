//! Error types for the chatmem core library.

use thiserror::Error;

/// Top-level error type for all chatmem operations.
#[derive(Error, Debug)]
pub enum ChatmemError {
    /// A memory failed validation and was not stored.
    #[error("Invalid memory: {reason}")]
    InvalidMemory {
        /// Why the memory was rejected.
        reason: String,
    },

    /// A memory kind string did not name one of the five known kinds.
    #[error("Unknown memory kind: {0}")]
    UnknownKind(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ChatmemError>;
