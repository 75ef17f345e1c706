//! Bulk command construction and submission.

use tracing::{info, warn};

use super::error::MigrationError;
use super::migrator::BulkMigrator;
use crate::bulk::BulkCommand;

/// Principal every migration command runs as.
pub const SYSTEM_USERNAME: &str = "system";

/// Bulk action handled by the migration computation.
pub const MIGRATION_ACTION: &str = "migration";

/// Bulk parameter carrying the migration id.
pub const PARAM_MIGRATION_ID: &str = "migrationId";

/// Bulk parameter carrying the step name.
pub const PARAM_MIGRATION_STEP: &str = "migrationStep";

impl BulkMigrator {
    /// Command running `step` of `migration_id` over one repository.
    pub fn create_bulk_command(&self, repository: &str, migration_id: &str, step: &str) -> BulkCommand {
        BulkCommand::new(
            MIGRATION_ACTION,
            repository,
            self.migration.scroll_query(step),
        )
        .with_username(SYSTEM_USERNAME)
        .with_bucket_size(self.runtime.settings.bucket_size)
        .with_param(PARAM_MIGRATION_ID, migration_id)
        .with_param(PARAM_MIGRATION_STEP, step)
    }

    /// Submit one command per repository, in enumeration order, and return
    /// their bulk ids without waiting for them.
    ///
    /// When a submission fails, the commands already submitted are aborted.
    pub async fn dispatch(&self, step: &str) -> Result<Vec<String>, MigrationError> {
        let migration_id = self.descriptor.id.as_str();
        let mut bulk_ids = Vec::new();

        for repository in self.runtime.repositories.repository_names() {
            let command = self.create_bulk_command(&repository, migration_id, step);
            match self.runtime.bulk.submit(command).await {
                Ok(bulk_id) => {
                    info!(
                        "Migration {} step {}: submitted {} on repository {}",
                        migration_id, step, bulk_id, repository
                    );
                    bulk_ids.push(bulk_id);
                }
                Err(e) => {
                    self.abort_all(&bulk_ids).await;
                    return Err(e.into());
                }
            }
        }

        Ok(bulk_ids)
    }

    /// Abort every command in `bulk_ids`. Failures are logged.
    pub(super) async fn abort_all(&self, bulk_ids: &[String]) {
        for bulk_id in bulk_ids {
            if let Err(e) = self.runtime.bulk.abort(bulk_id).await {
                warn!("Failed to abort bulk command {}: {}", bulk_id, e);
            }
        }
    }
}
