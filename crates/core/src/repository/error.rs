//! Error types for the repository module.

use thiserror::Error;

/// Errors raised by repositories and their sessions.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No repository with this name is registered.
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored record could not be decoded.
    #[error("corrupted record {id}: {reason}")]
    CorruptedRecord { id: String, reason: String },

    /// Transaction misuse (commit without begin, nested begin).
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
