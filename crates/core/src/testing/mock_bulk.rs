//! Mock bulk service for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bulk::{BulkCommand, BulkError, BulkService, BulkState, BulkStatus};

/// One scripted answer of [`MockBulkService::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStatus {
    Running { processed: u64, total: u64 },
    Completed { total: u64 },
    Failed { message: String, code: i32 },
    Aborted,
}

impl ScriptedStatus {
    fn apply(&self, status: &mut BulkStatus) {
        match self {
            Self::Running { processed, total } => {
                status.state = BulkState::Running;
                status.processed = *processed;
                status.total = *total;
            }
            Self::Completed { total } => {
                status.state = BulkState::Completed;
                status.processed = *total;
                status.total = *total;
            }
            Self::Failed { message, code } => {
                status.state = BulkState::Completed;
                status.error_count = 1;
                status.error_message = Some(message.clone());
                status.error_code = *code;
            }
            Self::Aborted => status.state = BulkState::Aborted,
        }
    }
}

#[derive(Debug)]
struct MockJob {
    status: BulkStatus,
    script: VecDeque<ScriptedStatus>,
    polls: usize,
}

/// Mock implementation of the BulkService trait.
///
/// Every status call of a command consumes the next scripted answer of its
/// repository; the last answer sticks. Repositories without a script complete
/// immediately with nothing to process.
///
/// # Example
///
/// ```rust,ignore
/// use ferry_core::testing::{MockBulkService, ScriptedStatus};
///
/// let bulk = MockBulkService::new();
/// bulk.script("default", vec![
///     ScriptedStatus::Running { processed: 0, total: 10 },
///     ScriptedStatus::Completed { total: 10 },
/// ]).await;
/// ```
#[derive(Debug, Default)]
pub struct MockBulkService {
    /// Scripted answers per repository, copied into each submitted command.
    scripts: Arc<RwLock<HashMap<String, Vec<ScriptedStatus>>>>,
    jobs: Arc<RwLock<HashMap<String, MockJob>>>,
    /// Submitted commands, in submission order.
    submissions: Arc<RwLock<Vec<BulkCommand>>>,
    /// Aborted bulk ids, in call order.
    aborts: Arc<RwLock<Vec<String>>>,
    /// If set, submissions on this repository fail.
    failing_repository: Arc<RwLock<Option<String>>>,
}

impl MockBulkService {
    /// Create a new mock bulk service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the statuses of commands submitted on `repository`.
    pub async fn script(&self, repository: &str, statuses: Vec<ScriptedStatus>) {
        self.scripts
            .write()
            .await
            .insert(repository.to_string(), statuses);
    }

    /// Make submissions on `repository` fail.
    pub async fn fail_submissions_on(&self, repository: &str) {
        *self.failing_repository.write().await = Some(repository.to_string());
    }

    /// Get all submitted commands.
    pub async fn recorded_submissions(&self) -> Vec<BulkCommand> {
        self.submissions.read().await.clone()
    }

    /// Get all aborted bulk ids.
    pub async fn recorded_aborts(&self) -> Vec<String> {
        self.aborts.read().await.clone()
    }

    /// Number of status calls made for `bulk_id`.
    pub async fn poll_count(&self, bulk_id: &str) -> usize {
        self.jobs
            .read()
            .await
            .get(bulk_id)
            .map(|job| job.polls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl BulkService for MockBulkService {
    async fn submit(&self, command: BulkCommand) -> Result<String, BulkError> {
        if self.failing_repository.read().await.as_deref() == Some(command.repository.as_str()) {
            return Err(BulkError::Internal(format!(
                "cannot submit on {}",
                command.repository
            )));
        }

        let script = self
            .scripts
            .read()
            .await
            .get(&command.repository)
            .cloned()
            .unwrap_or_else(|| vec![ScriptedStatus::Completed { total: 0 }]);

        let bulk_id = command.id.clone();
        self.jobs.write().await.insert(
            bulk_id.clone(),
            MockJob {
                status: BulkStatus::scheduled(&command),
                script: script.into(),
                polls: 0,
            },
        );
        self.submissions.write().await.push(command);
        Ok(bulk_id)
    }

    async fn status(&self, bulk_id: &str) -> Result<BulkStatus, BulkError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(bulk_id)
            .ok_or_else(|| BulkError::NotFound(bulk_id.to_string()))?;
        job.polls += 1;

        if job.status.state != BulkState::Aborted {
            let next = if job.script.len() > 1 {
                job.script.pop_front()
            } else {
                job.script.front().cloned()
            };
            if let Some(next) = next {
                next.apply(&mut job.status);
            }
        }
        Ok(job.status.clone())
    }

    async fn abort(&self, bulk_id: &str) -> Result<BulkStatus, BulkError> {
        self.aborts.write().await.push(bulk_id.to_string());

        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(bulk_id)
            .ok_or_else(|| BulkError::NotFound(bulk_id.to_string()))?;
        if !job.status.state.is_terminal() {
            job.status.state = BulkState::Aborted;
        }
        Ok(job.status.clone())
    }
}
