//! Migrator contracts and the bulk-backed migrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::context::MigrationContext;
use super::descriptor::MigrationDescriptor;
use super::error::MigrationError;
use super::status::MigrationStatusStore;
use crate::bulk::{BulkParams, BulkService};
use crate::cluster::{ClusterActionService, ProcessorLeases};
use crate::config::BulkConfig;
use crate::repository::{RepositoryService, ScrollQuery, Session};

/// A migration implementation.
#[async_trait]
pub trait Migrator: Send + Sync {
    fn descriptor(&self) -> &MigrationDescriptor;

    /// Deduce the current state from the repositories.
    async fn probe_state(&self) -> Result<String, MigrationError>;

    /// Execute `step`, returning once it finished, failed or was shut down.
    async fn run(&self, step: &str, ctx: &dyn MigrationContext) -> Result<(), MigrationError>;

    /// Called after a run when the migrator is registered as invalidating.
    fn notify_status_change(&self) {}

    /// The per-record logic when this migrator runs its steps as bulk
    /// commands.
    fn bulk_migration(&self) -> Option<Arc<dyn BulkMigration>> {
        None
    }
}

/// Migration-specific logic plugged into [`BulkMigrator`].
///
/// All methods run synchronously on a blocking thread, inside a transaction
/// owned by the caller.
pub trait BulkMigration: Send + Sync {
    /// Candidate state for one repository, `None` when indeterminate.
    fn probe_session(&self, session: &dyn Session) -> Result<Option<String>, MigrationError>;

    /// Records a step has to visit.
    fn scroll_query(&self, step: &str) -> ScrollQuery;

    /// Migrate one bucket of records. The step name is in `params`.
    fn compute(
        &self,
        session: &dyn Session,
        ids: &[String],
        params: &BulkParams,
    ) -> Result<(), MigrationError>;
}

/// Registered form of a migrator.
#[derive(Clone)]
pub enum MigratorHandle {
    Direct(Arc<dyn Migrator>),
    /// Notifies the migrator of a status change after every run.
    Invalidating(Arc<dyn Migrator>),
}

impl MigratorHandle {
    /// The wrapped migrator.
    pub fn inner(&self) -> &Arc<dyn Migrator> {
        match self {
            Self::Direct(migrator) | Self::Invalidating(migrator) => migrator,
        }
    }

    pub fn descriptor(&self) -> &MigrationDescriptor {
        self.inner().descriptor()
    }

    pub async fn probe_state(&self) -> Result<String, MigrationError> {
        self.inner().probe_state().await
    }

    pub async fn run(&self, step: &str, ctx: &dyn MigrationContext) -> Result<(), MigrationError> {
        let result = self.inner().run(step, ctx).await;
        if let Self::Invalidating(migrator) = self {
            migrator.notify_status_change();
        }
        result
    }
}

/// Tunables of bulk runs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Delay between two status polls.
    pub poll_interval: Duration,
    /// Stream processor consuming migration commands.
    pub processor: String,
    pub bucket_size: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&BulkConfig::default())
    }
}

impl From<&BulkConfig> for RunSettings {
    fn from(config: &BulkConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            processor: config.processor.clone(),
            bucket_size: config.bucket_size,
        }
    }
}

/// Services shared by every bulk migrator of a host.
#[derive(Clone)]
pub struct MigrationRuntime {
    pub repositories: Arc<dyn RepositoryService>,
    pub bulk: Arc<dyn BulkService>,
    pub cluster: Arc<dyn ClusterActionService>,
    /// Consulted before stopping the shared processor.
    pub statuses: Arc<dyn MigrationStatusStore>,
    pub leases: Arc<ProcessorLeases>,
    /// Cancelled when the host shuts down.
    pub interrupt: CancellationToken,
    pub settings: RunSettings,
}

/// Invoked with the migration id after a status change.
pub type StatusChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Migrator running each step as one bulk command per repository.
///
/// Probing lives in `prober.rs`, command construction in `dispatcher.rs` and
/// the run loop in `orchestrator.rs`.
pub struct BulkMigrator {
    pub(super) descriptor: Arc<MigrationDescriptor>,
    pub(super) migration: Arc<dyn BulkMigration>,
    pub(super) runtime: MigrationRuntime,
    on_status_change: Option<StatusChangeCallback>,
}

impl BulkMigrator {
    pub fn new(
        descriptor: MigrationDescriptor,
        migration: Arc<dyn BulkMigration>,
        runtime: MigrationRuntime,
    ) -> Result<Self, MigrationError> {
        descriptor.validate()?;
        Ok(Self {
            descriptor: Arc::new(descriptor),
            migration,
            runtime,
            on_status_change: None,
        })
    }

    pub fn with_status_listener(mut self, callback: StatusChangeCallback) -> Self {
        self.on_status_change = Some(callback);
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

#[async_trait]
impl Migrator for BulkMigrator {
    fn descriptor(&self) -> &MigrationDescriptor {
        &self.descriptor
    }

    async fn probe_state(&self) -> Result<String, MigrationError> {
        self.probe().await
    }

    async fn run(&self, step: &str, ctx: &dyn MigrationContext) -> Result<(), MigrationError> {
        self.run_step(step, ctx).await
    }

    fn notify_status_change(&self) {
        if let Some(callback) = &self.on_status_change {
            callback(&self.descriptor.id);
        }
    }

    fn bulk_migration(&self) -> Option<Arc<dyn BulkMigration>> {
        Some(Arc::clone(&self.migration))
    }
}
