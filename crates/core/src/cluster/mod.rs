//! Cluster-wide actions on stream processors.
//!
//! Migrations share one stream processor. It is started through
//! [`START_CONSUMERS_ACTION`] at the beginning of every run and stopped through
//! [`STOP_CONSUMERS_ACTION`] once nothing needs it any more. [`ProcessorLeases`]
//! counts the local runs holding a processor so that two runs finishing at the
//! same time cannot both decide to stop it.

mod leases;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub use leases::{ProcessorLease, ProcessorLeases};

/// Starts the consumers of a stream processor.
pub const START_CONSUMERS_ACTION: &str = "startConsumers";

/// Stops the consumers of a stream processor.
pub const STOP_CONSUMERS_ACTION: &str = "stopConsumers";

/// Errors raised by cluster actions.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("unknown cluster action: {0}")]
    UnknownAction(String),

    #[error("unknown stream processor: {0}")]
    UnknownProcessor(String),

    #[error("cluster action {action} failed: {reason}")]
    ActionFailed { action: String, reason: String },
}

/// Executes an action on every node of the cluster.
#[async_trait]
pub trait ClusterActionService: Send + Sync {
    async fn execute_action(&self, action: &str, processor: &str) -> Result<(), ClusterError>;
}

/// Local control over stream processors.
pub trait ProcessorControl: Send + Sync {
    fn start_processor(&self, processor: &str) -> Result<(), ClusterError>;

    fn stop_processor(&self, processor: &str) -> Result<(), ClusterError>;

    fn is_processor_running(&self, processor: &str) -> bool;
}

/// Single-node cluster: actions apply to the local processor control.
pub struct LocalClusterActions {
    control: Arc<dyn ProcessorControl>,
}

impl LocalClusterActions {
    pub fn new(control: Arc<dyn ProcessorControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl ClusterActionService for LocalClusterActions {
    async fn execute_action(&self, action: &str, processor: &str) -> Result<(), ClusterError> {
        debug!("Executing cluster action {} on {}", action, processor);
        match action {
            START_CONSUMERS_ACTION => {
                self.control.start_processor(processor)?;
                info!("Stream processor {} started", processor);
                Ok(())
            }
            STOP_CONSUMERS_ACTION => {
                self.control.stop_processor(processor)?;
                info!("Stream processor {} stopped", processor);
                Ok(())
            }
            other => Err(ClusterError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlagControl {
        running: Mutex<HashMap<String, bool>>,
    }

    impl ProcessorControl for FlagControl {
        fn start_processor(&self, processor: &str) -> Result<(), ClusterError> {
            self.running
                .lock()
                .unwrap()
                .insert(processor.to_string(), true);
            Ok(())
        }

        fn stop_processor(&self, processor: &str) -> Result<(), ClusterError> {
            let mut running = self.running.lock().unwrap();
            match running.get_mut(processor) {
                Some(flag) => {
                    *flag = false;
                    Ok(())
                }
                None => Err(ClusterError::UnknownProcessor(processor.to_string())),
            }
        }

        fn is_processor_running(&self, processor: &str) -> bool {
            self.running
                .lock()
                .unwrap()
                .get(processor)
                .copied()
                .unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_actions() {
        let control = Arc::new(FlagControl::default());
        let actions = LocalClusterActions::new(Arc::clone(&control) as Arc<dyn ProcessorControl>);

        actions
            .execute_action(START_CONSUMERS_ACTION, "bulk/migration")
            .await
            .unwrap();
        assert!(control.is_processor_running("bulk/migration"));

        // Starting twice is harmless
        actions
            .execute_action(START_CONSUMERS_ACTION, "bulk/migration")
            .await
            .unwrap();
        assert!(control.is_processor_running("bulk/migration"));

        actions
            .execute_action(STOP_CONSUMERS_ACTION, "bulk/migration")
            .await
            .unwrap();
        assert!(!control.is_processor_running("bulk/migration"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let actions = LocalClusterActions::new(Arc::new(FlagControl::default()));
        let result = actions.execute_action("reboot", "bulk/migration").await;
        assert!(matches!(result, Err(ClusterError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn test_control_error_propagates() {
        let actions = LocalClusterActions::new(Arc::new(FlagControl::default()));
        let result = actions
            .execute_action(STOP_CONSUMERS_ACTION, "never-started")
            .await;
        assert!(matches!(result, Err(ClusterError::UnknownProcessor(_))));
    }
}
