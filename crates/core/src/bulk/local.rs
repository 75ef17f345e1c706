//! In-process bulk service.
//!
//! Every submitted command gets its own tokio task. The task waits until the
//! command's stream processor runs, scrolls the query inside one transaction,
//! then hands the ids to a pooled computation bucket by bucket, each bucket in
//! its own transaction on a blocking thread. Abort is checked between buckets;
//! a bucket already handed over always runs to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::BulkError;
use super::traits::{BulkService, Computation, ComputationFactory};
use super::types::{BulkCommand, BulkState, BulkStatus};
use crate::cluster::{ClusterError, ProcessorControl};
use crate::metrics;
use crate::repository::{with_transaction, RepositoryService};

/// Computation registered for one action, with a pool of idle instances.
struct ActionRegistration {
    processor: String,
    factory: ComputationFactory,
    idle: Mutex<Vec<Box<dyn Computation>>>,
}

impl ActionRegistration {
    fn checkout(&self) -> Box<dyn Computation> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        pooled.unwrap_or_else(|| (self.factory)())
    }

    fn checkin(&self, computation: Box<dyn Computation>) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(computation);
    }
}

struct Job {
    status: BulkStatus,
    abort: CancellationToken,
    last_read: Mutex<DateTime<Utc>>,
}

impl Job {
    /// Terminal, completed before `cutoff` and not read since.
    fn expired(&self, cutoff: DateTime<Utc>) -> bool {
        let last_read = *self.last_read.lock().unwrap_or_else(PoisonError::into_inner);
        self.status.state.is_terminal()
            && self.status.completed_at.is_some_and(|at| at <= cutoff)
            && last_read <= cutoff
    }
}

type Jobs = Arc<RwLock<HashMap<String, Job>>>;

/// Bulk service running commands on the local tokio runtime.
pub struct LocalBulkService {
    repositories: Arc<dyn RepositoryService>,
    actions: StdRwLock<HashMap<String, Arc<ActionRegistration>>>,
    processors: Mutex<HashMap<String, watch::Sender<bool>>>,
    jobs: Jobs,
    retention: Duration,
}

const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

impl LocalBulkService {
    pub fn new(repositories: Arc<dyn RepositoryService>) -> Self {
        Self {
            repositories,
            actions: StdRwLock::new(HashMap::new()),
            processors: Mutex::new(HashMap::new()),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep terminal commands readable for `retention` after they complete
    /// or were last read.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Register the computation of `action`, consumed by `processor`.
    ///
    /// The processor is created stopped if it does not exist yet.
    pub fn register_action(&self, action: &str, processor: &str, factory: ComputationFactory) {
        self.processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(processor.to_string())
            .or_insert_with(|| watch::channel(false).0);

        self.actions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                action.to_string(),
                Arc::new(ActionRegistration {
                    processor: processor.to_string(),
                    factory,
                    idle: Mutex::new(Vec::new()),
                }),
            );
        info!("Registered bulk action {} on processor {}", action, processor);
    }

    /// Number of commands not yet in a terminal state.
    pub async fn active_commands(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.state.is_terminal())
            .count()
    }

    /// Forget terminal commands past the retention window.
    fn prune(&self, jobs: &mut HashMap<String, Job>) {
        let retention =
            chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = Utc::now() - retention;
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(cutoff));
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!("Forgot {} finished bulk commands", pruned);
        }
    }

    fn registration(&self, action: &str) -> Result<Arc<ActionRegistration>, BulkError> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action)
            .cloned()
            .ok_or_else(|| BulkError::UnknownAction(action.to_string()))
    }

    fn processor_receiver(&self, processor: &str) -> Result<watch::Receiver<bool>, BulkError> {
        self.processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(processor)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| BulkError::Internal(format!("no processor {}", processor)))
    }

    fn set_processor(&self, processor: &str, running: bool) -> Result<(), ClusterError> {
        let processors = self.processors.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = processors
            .get(processor)
            .ok_or_else(|| ClusterError::UnknownProcessor(processor.to_string()))?;
        let was_running = tx.send_replace(running);
        if was_running != running {
            debug!(
                "Processor {} is now {}",
                processor,
                if running { "running" } else { "stopped" }
            );
        }
        Ok(())
    }
}

#[async_trait]
impl BulkService for LocalBulkService {
    async fn submit(&self, command: BulkCommand) -> Result<String, BulkError> {
        let registration = self.registration(&command.action)?;
        let running = self.processor_receiver(&registration.processor)?;
        let abort = CancellationToken::new();
        let bulk_id = command.id.clone();

        {
            let mut jobs = self.jobs.write().await;
            self.prune(&mut jobs);
            jobs.insert(
                bulk_id.clone(),
                Job {
                    status: BulkStatus::scheduled(&command),
                    abort: abort.clone(),
                    last_read: Mutex::new(Utc::now()),
                },
            );
        }
        metrics::BULK_COMMANDS_SUBMITTED
            .with_label_values(&[command.action.as_str()])
            .inc();
        info!(
            "Submitted bulk command {} (action {}, repository {})",
            bulk_id, command.action, command.repository
        );

        let worker = CommandWorker {
            command: Arc::new(command),
            registration,
            repositories: Arc::clone(&self.repositories),
            jobs: Arc::clone(&self.jobs),
            running,
            abort,
        };
        tokio::spawn(worker.run());

        Ok(bulk_id)
    }

    async fn status(&self, bulk_id: &str) -> Result<BulkStatus, BulkError> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .get(bulk_id)
            .ok_or_else(|| BulkError::NotFound(bulk_id.to_string()))?;
        *job.last_read.lock().unwrap_or_else(PoisonError::into_inner) = Utc::now();
        Ok(job.status.clone())
    }

    async fn abort(&self, bulk_id: &str) -> Result<BulkStatus, BulkError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(bulk_id)
            .ok_or_else(|| BulkError::NotFound(bulk_id.to_string()))?;

        if !job.status.state.is_terminal() {
            job.status.state = BulkState::Aborted;
            job.status.completed_at = Some(Utc::now());
            info!("Aborted bulk command {}", bulk_id);
        }
        job.abort.cancel();
        Ok(job.status.clone())
    }
}

impl ProcessorControl for LocalBulkService {
    fn start_processor(&self, processor: &str) -> Result<(), ClusterError> {
        self.set_processor(processor, true)
    }

    fn stop_processor(&self, processor: &str) -> Result<(), ClusterError> {
        self.set_processor(processor, false)
    }

    fn is_processor_running(&self, processor: &str) -> bool {
        self.processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(processor)
            .map(|tx| *tx.borrow())
            .unwrap_or(false)
    }
}

/// Drives one command from scheduled to a terminal state.
struct CommandWorker {
    command: Arc<BulkCommand>,
    registration: Arc<ActionRegistration>,
    repositories: Arc<dyn RepositoryService>,
    jobs: Jobs,
    running: watch::Receiver<bool>,
    abort: CancellationToken,
}

impl CommandWorker {
    async fn run(mut self) {
        if !self.wait_for_processor().await {
            return;
        }

        self.update(|s| s.state = BulkState::Scrolling).await;
        let ids = match self.scroll().await {
            Ok(ids) => ids,
            Err(e) => {
                self.fail(e, 0).await;
                return;
            }
        };

        let total = ids.len() as u64;
        self.update(|s| {
            s.state = BulkState::Running;
            s.total = total;
        })
        .await;
        debug!("Bulk command {} scrolled {} ids", self.command.id, total);

        for bucket in ids.chunks(self.command.bucket_size.max(1)) {
            if !self.wait_for_processor().await {
                return;
            }

            let size = bucket.len() as u64;
            if let Err(e) = self.process_bucket(bucket.to_vec()).await {
                self.fail(e, size).await;
                return;
            }

            self.update(|s| s.processed += size).await;
            metrics::RECORDS_PROCESSED
                .with_label_values(&[self.command.action.as_str()])
                .inc_by(size);
        }

        self.update(|s| {
            s.state = BulkState::Completed;
            s.completed_at = Some(Utc::now());
        })
        .await;
        info!("Bulk command {} completed ({} records)", self.command.id, total);
    }

    /// Block until the processor runs. `false` when the command was aborted
    /// or the processor disappeared.
    async fn wait_for_processor(&mut self) -> bool {
        loop {
            if self.abort.is_cancelled() {
                return false;
            }
            if *self.running.borrow() {
                return true;
            }
            tokio::select! {
                _ = self.abort.cancelled() => return false,
                changed = self.running.changed() => {
                    if changed.is_err() {
                        warn!("Processor of bulk command {} is gone", self.command.id);
                        return false;
                    }
                }
            }
        }
    }

    async fn scroll(&self) -> Result<Vec<String>, BulkError> {
        let repositories = Arc::clone(&self.repositories);
        let command = Arc::clone(&self.command);

        tokio::task::spawn_blocking(move || {
            with_transaction(repositories.as_ref(), &command.repository, |session| {
                session.query_ids(&command.query).map_err(BulkError::from)
            })
        })
        .await
        .map_err(|e| BulkError::Internal(format!("scroll task failed: {}", e)))?
    }

    async fn process_bucket(&self, bucket: Vec<String>) -> Result<(), BulkError> {
        let mut computation = self.registration.checkout();
        let repositories = Arc::clone(&self.repositories);
        let command = Arc::clone(&self.command);

        let (computation, result) = tokio::task::spawn_blocking(move || {
            let result = with_transaction(repositories.as_ref(), &command.repository, |session| {
                computation.start_bucket(&command)?;
                computation.compute(session, &bucket, &command.params)
            });
            (computation, result)
        })
        .await
        .map_err(|e| BulkError::Internal(format!("bucket task failed: {}", e)))?;

        self.registration.checkin(computation);
        result
    }

    async fn fail(&self, error: BulkError, failed: u64) {
        error!("Bulk command {} failed: {}", self.command.id, error);
        self.update(|s| {
            s.error_count += failed;
            s.error_message = Some(error.to_string());
            s.error_code = error.code();
            s.state = BulkState::Completed;
            s.completed_at = Some(Utc::now());
        })
        .await;
    }

    /// Apply `f` unless the command was aborted meanwhile.
    async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut BulkStatus),
    {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&self.command.id) {
            if job.status.state != BulkState::Aborted {
                f(&mut job.status);
            }
        }
    }
}
