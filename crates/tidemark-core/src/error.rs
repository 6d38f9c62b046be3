//! Error types for tidemark-core

use thiserror::Error;

/// Result type alias using tidemark-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tidemark-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence layer could not be opened or initialized
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A write transaction against the local store aborted
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),

    /// Non-write SQLite failure (reads, row mapping)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Network/transport failure reaching the remote service
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// The remote service validated and rejected a mutation
    #[error("Remote rejected mutation: {0}")]
    RemoteRejected(String),

    /// A sync cycle is already running on this manager instance
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
