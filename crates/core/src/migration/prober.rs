//! State deduction across repositories.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::descriptor::MigrationDescriptor;
use super::error::MigrationError;
use super::migrator::BulkMigrator;
use crate::repository::with_transaction;

impl BulkMigrator {
    /// Probe every repository, each in its own transaction, and deduce the
    /// migration state.
    ///
    /// Assumes no step of this migration is running.
    pub(super) async fn probe(&self) -> Result<String, MigrationError> {
        let repositories = Arc::clone(&self.runtime.repositories);
        let migration = Arc::clone(&self.migration);
        let descriptor = Arc::clone(&self.descriptor);

        let candidates = tokio::task::spawn_blocking(move || {
            let mut candidates = HashSet::new();
            for repository in repositories.repository_names() {
                let probed = with_transaction(repositories.as_ref(), &repository, |session| {
                    migration.probe_session(session)
                })?;
                debug!(
                    "Migration {}: repository {} probed as {:?}",
                    descriptor.id, repository, probed
                );
                candidates.extend(probed);
            }
            Ok::<_, MigrationError>(candidates)
        })
        .await
        .map_err(|e| MigrationError::Compute(format!("probe task failed: {}", e)))??;

        let state = deduce_state(&self.descriptor, &candidates)?;
        info!("Migration {} is in state {}", self.descriptor.id, state);
        Ok(state)
    }
}

/// First declared state, in progression order, present among `candidates`.
///
/// With repositories at different states, the least advanced one wins so that
/// the next step still visits every repository.
pub fn deduce_state(
    descriptor: &MigrationDescriptor,
    candidates: &HashSet<String>,
) -> Result<String, MigrationError> {
    descriptor
        .state_ids()
        .find(|state| candidates.contains(*state))
        .map(str::to_string)
        .ok_or_else(|| MigrationError::NoDeducibleState {
            migration: descriptor.id.clone(),
        })
}
