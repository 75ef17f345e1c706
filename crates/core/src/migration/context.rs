//! Progress sink and cancellation flag handed to a running step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::status::{MigrationStatus, MigrationStatusStore};

/// Caller-side view of a running step.
pub trait MigrationContext: Send + Sync {
    /// Report progress. `total` is `-1` when not known yet.
    fn report_progress(&self, message: &str, num: u64, total: i64);

    fn report_error(&self, message: &str, code: i32);

    fn is_shutdown_requested(&self) -> bool;

    /// Ask the step to stop at its next check.
    fn request_shutdown(&self);
}

/// Context writing progress into the status store.
pub struct StatusMigrationContext {
    migration_id: String,
    statuses: Arc<dyn MigrationStatusStore>,
    shutdown: AtomicBool,
}

impl StatusMigrationContext {
    pub fn new(migration_id: impl Into<String>, statuses: Arc<dyn MigrationStatusStore>) -> Self {
        Self {
            migration_id: migration_id.into(),
            statuses,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    /// Apply `f` to the stored status. Store failures are logged, never
    /// propagated.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut MigrationStatus),
    {
        let mut status = match self.statuses.get(&self.migration_id) {
            Ok(Some(status)) => status,
            Ok(None) => MigrationStatus::idle(&self.migration_id, None),
            Err(e) => {
                warn!("Failed to load status of {}: {}", self.migration_id, e);
                return;
            }
        };

        f(&mut status);
        status.ping_time = Some(Utc::now());

        if let Err(e) = self.statuses.put(&status) {
            warn!("Failed to store status of {}: {}", self.migration_id, e);
        }
    }
}

impl MigrationContext for StatusMigrationContext {
    fn report_progress(&self, message: &str, num: u64, total: i64) {
        debug!(
            "Migration {}: {} ({}/{})",
            self.migration_id, message, num, total
        );
        self.update(|status| {
            status.progress_message = Some(message.to_string());
            status.progress_num = num;
            status.progress_total = total;
        });
    }

    fn report_error(&self, message: &str, code: i32) {
        error!(
            "Migration {} failed with code {}: {}",
            self.migration_id, code, message
        );
        self.update(|status| status.error = Some(format!("{} (code {})", message, code)));
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested for migration {}", self.migration_id);
        }
    }
}
