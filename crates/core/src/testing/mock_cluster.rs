//! Mock cluster action service for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cluster::{ClusterActionService, ClusterError};

/// A recorded cluster action for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAction {
    pub action: String,
    pub processor: String,
}

/// Mock implementation of the ClusterActionService trait.
///
/// Records every action. Actions never fail unless one is configured to.
#[derive(Debug, Default)]
pub struct MockClusterActions {
    actions: Arc<RwLock<Vec<RecordedAction>>>,
    /// If set, this action fails.
    failing_action: Arc<RwLock<Option<String>>>,
}

impl MockClusterActions {
    /// Create a new mock cluster action service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded actions.
    pub async fn recorded_actions(&self) -> Vec<RecordedAction> {
        self.actions.read().await.clone()
    }

    /// Number of times `action` was executed.
    pub async fn action_count(&self, action: &str) -> usize {
        self.actions
            .read()
            .await
            .iter()
            .filter(|a| a.action == action)
            .count()
    }

    /// Make every execution of `action` fail.
    pub async fn fail_action(&self, action: &str) {
        *self.failing_action.write().await = Some(action.to_string());
    }
}

#[async_trait]
impl ClusterActionService for MockClusterActions {
    async fn execute_action(&self, action: &str, processor: &str) -> Result<(), ClusterError> {
        self.actions.write().await.push(RecordedAction {
            action: action.to_string(),
            processor: processor.to_string(),
        });

        if self.failing_action.read().await.as_deref() == Some(action) {
            return Err(ClusterError::ActionFailed {
                action: action.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}
