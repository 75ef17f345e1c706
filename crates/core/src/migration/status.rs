//! Persisted status of each migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by status stores.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status database error: {0}")]
    Database(String),

    #[error("corrupted status for migration {id}: {reason}")]
    Corrupted { id: String, reason: String },
}

impl From<rusqlite::Error> for StatusError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// What is known about a migration: its state and, while a step runs, the
/// step and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub id: String,
    /// Last probed or reached state.
    pub state: Option<String>,
    /// Running step, `None` when idle.
    pub step: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    /// Last time the running step reported progress.
    pub ping_time: Option<DateTime<Utc>>,
    pub progress_message: Option<String>,
    pub progress_num: u64,
    /// Total to process, `-1` when not known yet.
    pub progress_total: i64,
    /// Error of the last failed step.
    pub error: Option<String>,
}

impl MigrationStatus {
    /// Idle status in `state`.
    pub fn idle(id: impl Into<String>, state: Option<String>) -> Self {
        Self {
            id: id.into(),
            state,
            step: None,
            start_time: None,
            ping_time: None,
            progress_message: None,
            progress_num: 0,
            progress_total: -1,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.step.is_some()
    }

    /// Mark `step` as started now. Clears progress and the last error.
    pub fn start(&mut self, step: &str) {
        let now = Utc::now();
        self.step = Some(step.to_string());
        self.start_time = Some(now);
        self.ping_time = Some(now);
        self.progress_message = None;
        self.progress_num = 0;
        self.progress_total = -1;
        self.error = None;
    }

    /// Back to idle, keeping the last progress for display.
    pub fn finish(&mut self) {
        self.step = None;
        self.ping_time = Some(Utc::now());
    }
}

/// Storage of migration statuses.
pub trait MigrationStatusStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<MigrationStatus>, StatusError>;

    fn put(&self, status: &MigrationStatus) -> Result<(), StatusError>;

    /// Every stored status, ordered by id.
    fn list(&self) -> Result<Vec<MigrationStatus>, StatusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_finish() {
        let mut status = MigrationStatus::idle("m", Some("legacy".into()));
        assert!(!status.is_running());

        status.error = Some("previous failure".into());
        status.start("rename");
        assert!(status.is_running());
        assert_eq!(status.step.as_deref(), Some("rename"));
        assert!(status.error.is_none());
        assert_eq!(status.progress_total, -1);

        status.progress_num = 10;
        status.finish();
        assert!(!status.is_running());
        assert_eq!(status.progress_num, 10);
        assert_eq!(status.state.as_deref(), Some("legacy"));
    }
}
