//! Error types for the migration module.

use thiserror::Error;

use super::status::StatusError;
use crate::bulk::BulkError;
use crate::cluster::ClusterError;
use crate::repository::RepositoryError;

/// Errors raised while describing, probing or running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unknown migration: {0}")]
    UnknownMigration(String),

    #[error("unknown step {step} for migration {migration}")]
    UnknownStep { migration: String, step: String },

    /// No declared state matched what the repositories report.
    #[error("cannot deduce the state of migration {migration}")]
    NoDeducibleState { migration: String },

    /// The registered migrator does not run its steps as bulk commands.
    #[error("migrator of {0} is not a bulk migrator")]
    NotABulkMigrator(String),

    #[error("missing bulk parameter: {0}")]
    MissingParameter(String),

    #[error("migration {0} is already running")]
    AlreadyRunning(String),

    #[error("step {step} of migration {migration} starts from state {expected}, current state is {actual}")]
    InvalidStepState {
        migration: String,
        step: String,
        expected: String,
        actual: String,
    },

    #[error("invalid migration descriptor {migration}: {reason}")]
    InvalidDescriptor { migration: String, reason: String },

    /// A bulk command of the run reported an error.
    #[error("bulk command failed ({code}): {message}")]
    BulkFailed { message: String, code: i32 },

    /// The host is shutting down.
    #[error("migration interrupted")]
    Interrupted,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("bulk error: {0}")]
    Bulk(#[from] BulkError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("status store error: {0}")]
    Status(#[from] StatusError),

    #[error("migration computation failed: {0}")]
    Compute(String),
}

impl MigrationError {
    /// Whether retrying the same call cannot succeed without operator action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownMigration(_)
                | Self::UnknownStep { .. }
                | Self::NoDeducibleState { .. }
                | Self::NotABulkMigrator(_)
                | Self::MissingParameter(_)
                | Self::InvalidDescriptor { .. }
                | Self::Interrupted
        )
    }

    /// Error code handed to `MigrationContext::report_error`.
    pub fn code(&self) -> i32 {
        match self {
            Self::BulkFailed { code, .. } => *code,
            Self::Bulk(inner) => inner.code(),
            Self::UnknownMigration(_) | Self::UnknownStep { .. } => 404,
            Self::AlreadyRunning(_) | Self::InvalidStepState { .. } => 409,
            Self::Repository(_) | Self::Interrupted => 503,
            _ => 500,
        }
    }
}

impl From<MigrationError> for BulkError {
    fn from(error: MigrationError) -> Self {
        match error {
            MigrationError::Bulk(inner) => inner,
            MigrationError::Repository(inner) => BulkError::Repository(inner),
            other => BulkError::Compute(other.to_string()),
        }
    }
}
