//! Error types for hope-core.

use thiserror::Error;

use crate::chain::ChainRef;
use crate::config::ConfigValidationError;

/// Result type alias using hope-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for memory, chain, codec and pool operations
#[derive(Error, Debug)]
pub enum Error {
    // Boundary validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Chain errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("chain conflict: snapshot extends {expected:?} but head is {actual:?}")]
    ChainConflict {
        expected: Option<ChainRef>,
        actual: Option<ChainRef>,
    },

    // SHP errors
    #[error("protocol error: {0}")]
    Protocol(String),

    // Pool errors
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[cfg(feature = "db")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is a chain conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ChainConflict { .. })
    }

    /// Whether the caller may retry the same operation and expect it to succeed.
    ///
    /// Conflicts are retried against the new head; pool exhaustion once
    /// connections are released. Nothing in this crate retries on its own.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ChainConflict { .. } | Self::PoolExhausted { .. })
    }
}
