//! Bulk command and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::repository::ScrollQuery;

/// Named parameters attached to a bulk command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkParams(Map<String, Value>);

impl BulkParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String parameter, `None` when missing or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A scroll-and-process command targeting one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCommand {
    /// Unique id, also the bulk id returned by `submit`.
    pub id: String,
    /// Action name selecting the computation.
    pub action: String,
    pub repository: String,
    /// Principal the command runs as.
    pub username: String,
    pub query: ScrollQuery,
    /// Record ids per computation invocation.
    pub bucket_size: usize,
    pub params: BulkParams,
}

impl BulkCommand {
    pub fn new(
        action: impl Into<String>,
        repository: impl Into<String>,
        query: ScrollQuery,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            repository: repository.into(),
            username: String::new(),
            query,
            bucket_size: 100,
            params: BulkParams::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size.max(1);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params = self.params.with(name, value);
        self
    }
}

/// Execution state of a bulk command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkState {
    /// Submitted, waiting for its processor.
    Scheduled,
    /// Materializing the ids to process.
    Scrolling,
    Running,
    Completed,
    Aborted,
}

impl BulkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Observable status of a bulk command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatus {
    pub id: String,
    pub action: String,
    pub repository: String,
    pub state: BulkState,
    pub processed: u64,
    pub total: u64,
    pub error_count: u64,
    pub error_message: Option<String>,
    pub error_code: i32,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkStatus {
    /// Initial status of a freshly submitted command.
    pub fn scheduled(command: &BulkCommand) -> Self {
        Self {
            id: command.id.clone(),
            action: command.action.clone(),
            repository: command.repository.clone(),
            state: BulkState::Scheduled,
            processed: 0,
            total: 0,
            error_count: 0,
            error_message: None,
            error_code: 0,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_count > 0 || self.error_message.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.state == BulkState::Completed
    }
}
