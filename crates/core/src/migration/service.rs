//! Hosting service: migration statuses, probing and asynchronous step runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::computation::migration_computation_factory;
use super::context::{MigrationContext, StatusMigrationContext};
use super::descriptor::MigrationDescriptor;
use super::error::MigrationError;
use super::migrator::MigratorHandle;
use super::registry::{MigrationRegistry, MigratorRegistry};
use super::status::{MigrationStatus, MigrationStatusStore};
use crate::bulk::ComputationFactory;

/// A registered migration with its current status.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub id: String,
    pub description: String,
    pub descriptor: MigrationDescriptor,
    pub status: MigrationStatus,
}

type RunningSteps = Arc<Mutex<HashMap<String, Arc<StatusMigrationContext>>>>;

/// Owns the migrator registry and the statuses of every migration.
pub struct MigrationService {
    registry: Arc<MigratorRegistry>,
    statuses: Arc<dyn MigrationStatusStore>,
    interrupt: CancellationToken,
    running: RunningSteps,
}

impl MigrationService {
    pub fn new(
        registry: Arc<MigratorRegistry>,
        statuses: Arc<dyn MigrationStatusStore>,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            registry,
            statuses,
            interrupt,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Computation factory for the migration bulk action, resolving
    /// migrators from this service's registry.
    pub fn computation_factory(&self) -> ComputationFactory {
        let registry: Arc<dyn MigrationRegistry> = self.registry.clone();
        migration_computation_factory(Arc::downgrade(&registry))
    }

    pub fn registry(&self) -> &MigratorRegistry {
        &self.registry
    }

    pub fn descriptor(&self, id: &str) -> Result<&MigrationDescriptor, MigrationError> {
        Ok(self.handle(id)?.descriptor())
    }

    /// Every registered migration, in registration order.
    ///
    /// A migration whose state cannot be probed is listed without state and
    /// with the probe error.
    pub async fn migrations(&self) -> Vec<MigrationSummary> {
        let mut summaries = Vec::with_capacity(self.registry.len());

        for handle in self.registry.handles() {
            let descriptor = handle.descriptor();
            let status = match self.status(&descriptor.id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Cannot determine status of {}: {}", descriptor.id, e);
                    let mut status = MigrationStatus::idle(&descriptor.id, None);
                    status.error = Some(e.to_string());
                    status
                }
            };
            summaries.push(MigrationSummary {
                id: descriptor.id.clone(),
                description: descriptor.description.clone(),
                descriptor: descriptor.clone(),
                status,
            });
        }

        summaries
    }

    /// Descriptor and status of a single migration.
    pub async fn summary(&self, id: &str) -> Result<MigrationSummary, MigrationError> {
        let descriptor = self.descriptor(id)?.clone();
        let status = self.status(id).await?;
        Ok(MigrationSummary {
            id: descriptor.id.clone(),
            description: descriptor.description.clone(),
            descriptor,
            status,
        })
    }

    /// Stored status of `id`, probed and stored first when none is known.
    pub async fn status(&self, id: &str) -> Result<MigrationStatus, MigrationError> {
        let handle = self.handle(id)?;
        if let Some(status) = self.statuses.get(id)? {
            return Ok(status);
        }

        let state = handle.probe_state().await?;
        let status = MigrationStatus::idle(id, Some(state));
        self.statuses.put(&status)?;
        Ok(status)
    }

    /// Probe the repositories and store the deduced state.
    pub async fn probe_and_set_state(&self, id: &str) -> Result<MigrationStatus, MigrationError> {
        let handle = self.handle(id)?;
        if self.is_running(id) {
            return Err(MigrationError::AlreadyRunning(id.to_string()));
        }

        let state = handle.probe_state().await?;
        let status = {
            let running = self.lock_running();
            let mut status = self
                .statuses
                .get(id)?
                .unwrap_or_else(|| MigrationStatus::idle(id, None));
            if running.contains_key(id) || status.is_running() {
                return Err(MigrationError::AlreadyRunning(id.to_string()));
            }
            status.state = Some(state);
            self.statuses.put(&status)?;
            status
        };

        info!("Migration {} probed as {:?}", id, status.state);
        Ok(status)
    }

    /// Start `step` of `id` in the background.
    ///
    /// The current state must be the step's source state. When the run
    /// succeeds the state becomes the step's target state; after a shutdown
    /// or an error it is left unchanged.
    pub async fn run_step(&self, id: &str, step: &str) -> Result<JoinHandle<()>, MigrationError> {
        let handle = self.handle(id)?.clone();
        let step_descriptor = handle.descriptor().require_step(step)?.clone();

        if self.is_running(id) {
            return Err(MigrationError::AlreadyRunning(id.to_string()));
        }
        let known = self.status(id).await?;

        let ctx = {
            let mut running = self.lock_running();
            let mut status = self.statuses.get(id)?.unwrap_or(known);
            if running.contains_key(id) || status.is_running() {
                return Err(MigrationError::AlreadyRunning(id.to_string()));
            }
            let current = status.state.clone().unwrap_or_default();
            if current != step_descriptor.from_state {
                return Err(MigrationError::InvalidStepState {
                    migration: id.to_string(),
                    step: step.to_string(),
                    expected: step_descriptor.from_state.clone(),
                    actual: current,
                });
            }

            status.start(step);
            self.statuses.put(&status)?;

            let ctx = Arc::new(StatusMigrationContext::new(id, Arc::clone(&self.statuses)));
            running.insert(id.to_string(), Arc::clone(&ctx));
            ctx
        };

        info!(
            "Starting step {} of migration {} ({} -> {})",
            step, id, step_descriptor.from_state, step_descriptor.to_state
        );

        let statuses = Arc::clone(&self.statuses);
        let running = Arc::clone(&self.running);
        let id = id.to_string();
        let step = step.to_string();
        let to_state = step_descriptor.to_state;

        Ok(tokio::spawn(async move {
            let result = handle.run(&step, ctx.as_ref()).await;

            let mut status = match statuses.get(&id) {
                Ok(Some(status)) => status,
                Ok(None) => MigrationStatus::idle(&id, None),
                Err(e) => {
                    warn!("Cannot load status of {} after its run: {}", id, e);
                    MigrationStatus::idle(&id, None)
                }
            };

            match result {
                Ok(()) if ctx.is_shutdown_requested() => {
                    info!("Step {} of migration {} was shut down", step, id);
                }
                Ok(()) => {
                    info!("Migration {} reached state {}", id, to_state);
                    status.state = Some(to_state);
                }
                Err(e) => {
                    warn!("Step {} of migration {} failed: {}", step, id, e);
                    status.error.get_or_insert_with(|| e.to_string());
                }
            }
            status.finish();

            if let Err(e) = statuses.put(&status) {
                warn!("Cannot store status of {} after its run: {}", id, e);
            }
            running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }))
    }

    /// Ask the running step of `id` to stop. Returns `false` when no step of
    /// `id` runs in this process.
    pub fn request_shutdown(&self, id: &str) -> Result<bool, MigrationError> {
        self.handle(id)?;
        match self.lock_running().get(id) {
            Some(ctx) => {
                ctx.request_shutdown();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Interrupt every running step: the host is going away.
    pub fn shutdown(&self) {
        let running = self.lock_running().len();
        info!("Interrupting migration service ({} running steps)", running);
        self.interrupt.cancel();
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.lock_running().contains_key(id)
    }

    /// Clear running statuses left behind by a previous process: steps not
    /// running here whose last ping is older than `stale_after`.
    pub fn recover_stale(&self, stale_after: Duration) -> Result<usize, MigrationError> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = Utc::now() - stale_after;
        let mut recovered = 0;

        for mut status in self.statuses.list()? {
            if !status.is_running() || self.is_running(&status.id) {
                continue;
            }
            if status.ping_time.is_some_and(|ping| ping > cutoff) {
                continue;
            }

            warn!(
                "Clearing stale step {:?} of migration {}",
                status.step, status.id
            );
            status.error = Some(format!(
                "step {} was interrupted",
                status.step.as_deref().unwrap_or_default()
            ));
            status.finish();
            self.statuses.put(&status)?;
            recovered += 1;
        }

        Ok(recovered)
    }

    fn handle(&self, id: &str) -> Result<&MigratorHandle, MigrationError> {
        self.registry
            .get(id)
            .ok_or_else(|| MigrationError::UnknownMigration(id.to_string()))
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<String, Arc<StatusMigrationContext>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MigrationRegistry for MigrationService {
    fn migrator(&self, id: &str) -> Option<MigratorHandle> {
        self.registry.migrator(id)
    }
}
