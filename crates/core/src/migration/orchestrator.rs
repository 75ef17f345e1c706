//! Run loop of a bulk migration step.
//!
//! A run starts the shared stream processor, dispatches one bulk command per
//! repository and polls their statuses until every command completed, one
//! failed, or a shutdown was requested. The processor is stopped afterwards
//! unless another migration still uses it.

use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::context::MigrationContext;
use super::error::MigrationError;
use super::migrator::BulkMigrator;
use crate::bulk::{BulkState, BulkStatus};
use crate::cluster::{ProcessorLease, START_CONSUMERS_ACTION, STOP_CONSUMERS_ACTION};
use crate::metrics;

/// Progress label while commands are still running.
pub const MIGRATING_MESSAGE: &str = "Migrating content";

/// Progress label once every command completed.
pub const DONE_MESSAGE: &str = "Done";

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Shutdown,
}

/// Progress of a run aggregated over its bulk commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub processed: u64,
    pub total: u64,
    /// Every command completed.
    pub finished: bool,
    /// At least one command was aborted.
    pub aborted: bool,
}

impl RunProgress {
    pub fn aggregate(statuses: &[BulkStatus]) -> Self {
        Self {
            processed: statuses.iter().map(|s| s.processed).sum(),
            total: statuses.iter().map(|s| s.total).sum(),
            finished: statuses.iter().all(|s| s.state == BulkState::Completed),
            aborted: statuses.iter().any(|s| s.state == BulkState::Aborted),
        }
    }

    pub fn message(&self) -> &'static str {
        if self.finished {
            DONE_MESSAGE
        } else {
            MIGRATING_MESSAGE
        }
    }
}

impl BulkMigrator {
    pub(super) async fn run_step(
        &self,
        step: &str,
        ctx: &dyn MigrationContext,
    ) -> Result<(), MigrationError> {
        let migration_id = self.descriptor.id.as_str();
        self.descriptor.require_step(step)?;

        let started = Instant::now();
        let processor = self.runtime.settings.processor.as_str();
        let lease = self.runtime.leases.acquire(processor, migration_id);
        let result = match self
            .runtime
            .cluster
            .execute_action(START_CONSUMERS_ACTION, processor)
            .await
        {
            Ok(()) => self.drive(step, lease, ctx).await,
            Err(e) => Err(e.into()),
        };

        let label = match &result {
            Ok(RunOutcome::Completed) => "completed",
            Ok(RunOutcome::Shutdown) => "shutdown",
            Err(_) => "failed",
        };
        metrics::MIGRATION_RUNS
            .with_label_values(&[migration_id, label])
            .inc();
        metrics::RUN_DURATION
            .with_label_values(&[migration_id])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                info!(
                    "Migration {} step {} ended: {:?}",
                    migration_id, step, outcome
                );
                Ok(())
            }
            Err(e) => {
                warn!("Migration {} step {} failed: {}", migration_id, step, e);
                if !matches!(e, MigrationError::BulkFailed { .. }) {
                    ctx.report_error(&e.to_string(), e.code());
                }
                Err(e)
            }
        }
    }

    /// Dispatch, poll until the commands settle, then release the processor.
    async fn drive(
        &self,
        step: &str,
        lease: ProcessorLease,
        ctx: &dyn MigrationContext,
    ) -> Result<RunOutcome, MigrationError> {
        info!("Migration {} step {} started", self.descriptor.id, step);
        ctx.report_progress("Initializing", 0, -1);

        let bulk_ids = self.dispatch(step).await?;
        let outcome = self.poll(&bulk_ids, ctx).await?;
        self.release_processor(lease).await?;
        Ok(outcome)
    }

    async fn poll(
        &self,
        bulk_ids: &[String],
        ctx: &dyn MigrationContext,
    ) -> Result<RunOutcome, MigrationError> {
        let migration_id = self.descriptor.id.as_str();

        loop {
            metrics::POLL_ITERATIONS
                .with_label_values(&[migration_id])
                .inc();

            let statuses = join_all(bulk_ids.iter().map(|id| self.runtime.bulk.status(id)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            let progress = RunProgress::aggregate(&statuses);

            if progress.aborted {
                ctx.request_shutdown();
            }
            if ctx.is_shutdown_requested() {
                info!(
                    "Migration {}: shutdown requested, aborting {} bulk commands",
                    migration_id,
                    bulk_ids.len()
                );
                self.abort_all(bulk_ids).await;
                return Ok(RunOutcome::Shutdown);
            }

            if let Some(failed) = statuses.iter().find(|s| s.has_error()) {
                let message = failed.error_message.clone().unwrap_or_else(|| {
                    format!(
                        "{} records failed in bulk command {}",
                        failed.error_count, failed.id
                    )
                });
                ctx.report_error(&message, failed.error_code);
                return Err(MigrationError::BulkFailed {
                    message,
                    code: failed.error_code,
                });
            }

            ctx.report_progress(
                progress.message(),
                progress.processed,
                i64::try_from(progress.total).unwrap_or(i64::MAX),
            );
            if progress.finished {
                return Ok(RunOutcome::Completed);
            }
            debug!(
                "Migration {}: {}/{} records",
                migration_id, progress.processed, progress.total
            );

            tokio::select! {
                _ = self.runtime.interrupt.cancelled() => {
                    warn!("Migration {} interrupted while waiting for bulk commands", migration_id);
                    return Err(MigrationError::Interrupted);
                }
                _ = tokio::time::sleep(self.runtime.settings.poll_interval) => {}
            }
        }
    }

    /// Stop the processor if this was its last local holder and no other
    /// migration is marked running.
    async fn release_processor(&self, lease: ProcessorLease) -> Result<(), MigrationError> {
        let processor = lease.processor().to_string();

        if !lease.release() {
            debug!("Processor {} still used by a local run", processor);
            return Ok(());
        }
        if self.other_migration_running()? {
            debug!("Processor {} still used by another migration", processor);
            return Ok(());
        }

        self.runtime
            .cluster
            .execute_action(STOP_CONSUMERS_ACTION, &processor)
            .await?;
        Ok(())
    }

    /// Whether the status store shows another migration running. Running
    /// statuses left by local runs that already returned are ignored.
    fn other_migration_running(&self) -> Result<bool, MigrationError> {
        let leases = &self.runtime.leases;
        Ok(self.runtime.statuses.list()?.iter().any(|status| {
            status.id != self.descriptor.id
                && status.is_running()
                && !leases.finished_locally(&status.id)
        }))
    }
}
