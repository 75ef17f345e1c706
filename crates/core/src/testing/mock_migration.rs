//! Scripted migrators and migration contexts for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bulk::BulkParams;
use crate::migration::{
    BulkMigration, MigrationContext, MigrationDescriptor, MigrationError, Migrator,
};
use crate::repository::{ScrollQuery, Session};

/// A progress report captured by [`RecordingMigrationContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub message: String,
    pub num: u64,
    pub total: i64,
}

/// Migration context keeping every report in memory.
#[derive(Debug, Default)]
pub struct RecordingMigrationContext {
    progress: Mutex<Vec<ProgressReport>>,
    errors: Mutex<Vec<(String, i32)>>,
    shutdown: AtomicBool,
}

impl RecordingMigrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all progress reports.
    pub fn progress(&self) -> Vec<ProgressReport> {
        self.progress.lock().unwrap().clone()
    }

    pub fn last_progress(&self) -> Option<ProgressReport> {
        self.progress.lock().unwrap().last().cloned()
    }

    /// Get all reported errors.
    pub fn errors(&self) -> Vec<(String, i32)> {
        self.errors.lock().unwrap().clone()
    }
}

impl MigrationContext for RecordingMigrationContext {
    fn report_progress(&self, message: &str, num: u64, total: i64) {
        self.progress.lock().unwrap().push(ProgressReport {
            message: message.to_string(),
            num,
            total,
        });
    }

    fn report_error(&self, message: &str, code: i32) {
        self.errors.lock().unwrap().push((message.to_string(), code));
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Bulk migration with fixed per-repository probe results.
///
/// `compute` records the ids it receives.
#[derive(Debug, Default)]
pub struct StaticMigration {
    probes: HashMap<String, String>,
    computed: Mutex<Vec<String>>,
}

impl StaticMigration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `repository` as `state`. Other repositories are indeterminate.
    pub fn with_probe(mut self, repository: &str, state: &str) -> Self {
        self.probes
            .insert(repository.to_string(), state.to_string());
        self
    }

    /// Ids received by `compute`, in call order.
    pub fn computed_ids(&self) -> Vec<String> {
        self.computed.lock().unwrap().clone()
    }
}

impl BulkMigration for StaticMigration {
    fn probe_session(&self, session: &dyn Session) -> Result<Option<String>, MigrationError> {
        Ok(self.probes.get(session.repository()).cloned())
    }

    fn scroll_query(&self, _step: &str) -> ScrollQuery {
        ScrollQuery::new()
    }

    fn compute(
        &self,
        _session: &dyn Session,
        ids: &[String],
        _params: &BulkParams,
    ) -> Result<(), MigrationError> {
        self.computed.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

/// Migrator with a scripted state and scripted runs.
pub struct StaticMigrator {
    descriptor: MigrationDescriptor,
    state: Mutex<Option<String>>,
    bulk_migration: Option<Arc<dyn BulkMigration>>,
    run_error: Option<String>,
    until_shutdown: bool,
    probes: AtomicUsize,
    runs: Mutex<Vec<String>>,
    status_changes: AtomicUsize,
}

impl StaticMigrator {
    /// A migrator whose state cannot be deduced until one is set.
    pub fn new(descriptor: MigrationDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(None),
            bulk_migration: None,
            run_error: None,
            until_shutdown: false,
            probes: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
            status_changes: AtomicUsize::new(0),
        }
    }

    pub fn with_state(self, state: &str) -> Self {
        self.set_state(state);
        self
    }

    pub fn with_bulk_migration(mut self, migration: Arc<dyn BulkMigration>) -> Self {
        self.bulk_migration = Some(migration);
        self
    }

    /// Make every run fail with `message`.
    pub fn with_run_error(mut self, message: &str) -> Self {
        self.run_error = Some(message.to_string());
        self
    }

    /// Make every run last until a shutdown is requested.
    pub fn until_shutdown(mut self) -> Self {
        self.until_shutdown = true;
        self
    }

    pub fn set_state(&self, state: &str) {
        *self.state.lock().unwrap() = Some(state.to_string());
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Steps run so far.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    pub fn status_changes(&self) -> usize {
        self.status_changes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Migrator for StaticMigrator {
    fn descriptor(&self) -> &MigrationDescriptor {
        &self.descriptor
    }

    async fn probe_state(&self) -> Result<String, MigrationError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| MigrationError::NoDeducibleState {
                migration: self.descriptor.id.clone(),
            })
    }

    async fn run(&self, step: &str, ctx: &dyn MigrationContext) -> Result<(), MigrationError> {
        self.descriptor.require_step(step)?;
        self.runs.lock().unwrap().push(step.to_string());
        ctx.report_progress("Initializing", 0, -1);

        if self.until_shutdown {
            while !ctx.is_shutdown_requested() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            return Ok(());
        }
        if let Some(message) = &self.run_error {
            ctx.report_error(message, 500);
            return Err(MigrationError::BulkFailed {
                message: message.clone(),
                code: 500,
            });
        }

        ctx.report_progress("Done", 1, 1);
        Ok(())
    }

    fn notify_status_change(&self) {
        self.status_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn bulk_migration(&self) -> Option<Arc<dyn BulkMigration>> {
        self.bulk_migration.clone()
    }
}
