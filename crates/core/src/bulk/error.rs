//! Error types for the bulk module.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors raised by the bulk service and by computations.
#[derive(Debug, Error)]
pub enum BulkError {
    /// No command with this bulk id.
    #[error("bulk command not found: {0}")]
    NotFound(String),

    /// No computation registered for the command's action.
    #[error("unknown bulk action: {0}")]
    UnknownAction(String),

    /// Repository access failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The computation rejected a bucket.
    #[error("computation failed: {0}")]
    Compute(String),

    /// Substrate failure (worker task died, channel closed).
    #[error("bulk service error: {0}")]
    Internal(String),
}

impl BulkError {
    /// Error code recorded in a failed command's status.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 404,
            Self::UnknownAction(_) => 400,
            Self::Repository(_) => 503,
            Self::Compute(_) | Self::Internal(_) => 500,
        }
    }
}
