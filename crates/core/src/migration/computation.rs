//! Bulk computation executing migration buckets.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::dispatcher::{PARAM_MIGRATION_ID, PARAM_MIGRATION_STEP};
use super::error::MigrationError;
use super::migrator::BulkMigration;
use super::registry::MigrationRegistry;
use crate::bulk::{BulkCommand, BulkError, BulkParams, Computation, ComputationFactory};
use crate::repository::Session;

enum ComputationState {
    Uninitialized,
    Bound {
        command_id: String,
        migration: Arc<dyn BulkMigration>,
    },
}

/// Resolves the migration of each command once and forwards its buckets.
///
/// The registry is held weakly: the registry owns the migrators, which own
/// the bulk service, which owns this computation.
pub struct MigrationComputation {
    registry: Weak<dyn MigrationRegistry>,
    state: ComputationState,
    lookups: usize,
}

impl MigrationComputation {
    pub fn new(registry: Weak<dyn MigrationRegistry>) -> Self {
        Self {
            registry,
            state: ComputationState::Uninitialized,
            lookups: 0,
        }
    }

    /// Registry lookups performed so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Command the computation is currently bound to.
    pub fn bound_command(&self) -> Option<&str> {
        match &self.state {
            ComputationState::Uninitialized => None,
            ComputationState::Bound { command_id, .. } => Some(command_id),
        }
    }

    fn resolve(&mut self, params: &BulkParams) -> Result<Arc<dyn BulkMigration>, MigrationError> {
        let migration_id = params
            .get_str(PARAM_MIGRATION_ID)
            .ok_or_else(|| MigrationError::MissingParameter(PARAM_MIGRATION_ID.to_string()))?;
        if params.get_str(PARAM_MIGRATION_STEP).is_none() {
            return Err(MigrationError::MissingParameter(
                PARAM_MIGRATION_STEP.to_string(),
            ));
        }

        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| MigrationError::UnknownMigration(migration_id.to_string()))?;
        self.lookups += 1;

        let handle = registry
            .migrator(migration_id)
            .ok_or_else(|| MigrationError::UnknownMigration(migration_id.to_string()))?;
        handle
            .inner()
            .bulk_migration()
            .ok_or_else(|| MigrationError::NotABulkMigrator(migration_id.to_string()))
    }
}

impl Computation for MigrationComputation {
    fn start_bucket(&mut self, command: &BulkCommand) -> Result<(), BulkError> {
        if let ComputationState::Bound { command_id, .. } = &self.state {
            if *command_id == command.id {
                return Ok(());
            }
        }

        self.state = ComputationState::Uninitialized;
        let migration = self.resolve(&command.params)?;
        debug!("Migration computation bound to bulk command {}", command.id);
        self.state = ComputationState::Bound {
            command_id: command.id.clone(),
            migration,
        };
        Ok(())
    }

    fn compute(
        &mut self,
        session: &dyn Session,
        ids: &[String],
        params: &BulkParams,
    ) -> Result<(), BulkError> {
        match &self.state {
            ComputationState::Bound { migration, .. } => {
                migration.compute(session, ids, params).map_err(BulkError::from)
            }
            ComputationState::Uninitialized => Err(BulkError::Compute(
                "migration computation used before start_bucket".to_string(),
            )),
        }
    }
}

/// Factory of [`MigrationComputation`]s for the migration bulk action.
pub fn migration_computation_factory(registry: Weak<dyn MigrationRegistry>) -> ComputationFactory {
    Arc::new(move || Box::new(MigrationComputation::new(registry.clone())) as Box<dyn Computation>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::dispatcher::MIGRATION_ACTION;
    use crate::migration::{MigrationDescriptor, MigratorHandle, MigratorRegistry};
    use crate::repository::{ScrollQuery, SqliteRepositoryService, RepositoryService};
    use crate::testing::{StaticMigration, StaticMigrator};

    fn command(migration_id: &str) -> BulkCommand {
        BulkCommand::new(MIGRATION_ACTION, "default", ScrollQuery::new())
            .with_param(PARAM_MIGRATION_ID, migration_id)
            .with_param(PARAM_MIGRATION_STEP, "go")
    }

    fn registry() -> (Arc<dyn MigrationRegistry>, Arc<StaticMigration>) {
        let migration = Arc::new(StaticMigration::new());
        let descriptor = MigrationDescriptor::new("bulk", "")
            .with_state("a", "")
            .with_state("b", "")
            .with_step("go", "a", "b", "");
        let plain = MigrationDescriptor::new("plain", "").with_state("a", "");

        let mut registry = MigratorRegistry::new();
        registry
            .register(MigratorHandle::Invalidating(Arc::new(
                StaticMigrator::new(descriptor).with_bulk_migration(migration.clone()),
            )))
            .unwrap();
        registry
            .register(MigratorHandle::Direct(Arc::new(StaticMigrator::new(plain))))
            .unwrap();
        (Arc::new(registry), migration)
    }

    #[test]
    fn test_lookup_once_per_command() {
        let (registry, migration) = registry();
        let mut computation = MigrationComputation::new(Arc::downgrade(&registry));
        let repositories = SqliteRepositoryService::in_memory(["default"]).unwrap();
        let session = repositories.open_session("default").unwrap();

        let first = command("bulk");
        for bucket in 0..3 {
            computation.start_bucket(&first).unwrap();
            let ids = vec![format!("id-{}", bucket)];
            computation
                .compute(session.as_ref(), &ids, &first.params)
                .unwrap();
        }
        assert_eq!(computation.lookups(), 1);
        assert_eq!(computation.bound_command(), Some(first.id.as_str()));
        assert_eq!(migration.computed_ids().len(), 3);

        let second = command("bulk");
        computation.start_bucket(&second).unwrap();
        assert_eq!(computation.lookups(), 2);
        assert_eq!(computation.bound_command(), Some(second.id.as_str()));
    }

    #[test]
    fn test_unknown_migration() {
        let (registry, _) = registry();
        let mut computation = MigrationComputation::new(Arc::downgrade(&registry));
        let err = computation.start_bucket(&command("nope")).unwrap_err();
        assert!(matches!(err, BulkError::Compute(msg) if msg.contains("unknown migration")));
        assert!(computation.bound_command().is_none());
    }

    #[test]
    fn test_not_a_bulk_migrator() {
        let (registry, _) = registry();
        let mut computation = MigrationComputation::new(Arc::downgrade(&registry));
        let err = computation.start_bucket(&command("plain")).unwrap_err();
        assert!(matches!(err, BulkError::Compute(msg) if msg.contains("not a bulk migrator")));
    }

    #[test]
    fn test_missing_parameters() {
        let (registry, _) = registry();
        let mut computation = MigrationComputation::new(Arc::downgrade(&registry));

        let no_id = BulkCommand::new(MIGRATION_ACTION, "default", ScrollQuery::new());
        let err = computation.start_bucket(&no_id).unwrap_err();
        assert!(matches!(err, BulkError::Compute(msg) if msg.contains(PARAM_MIGRATION_ID)));

        let no_step = BulkCommand::new(MIGRATION_ACTION, "default", ScrollQuery::new())
            .with_param(PARAM_MIGRATION_ID, "bulk");
        let err = computation.start_bucket(&no_step).unwrap_err();
        assert!(matches!(err, BulkError::Compute(msg) if msg.contains(PARAM_MIGRATION_STEP)));
        assert_eq!(computation.lookups(), 0);
    }

    #[test]
    fn test_compute_before_start_bucket() {
        let (registry, _) = registry();
        let mut computation = MigrationComputation::new(Arc::downgrade(&registry));
        let repositories = SqliteRepositoryService::in_memory(["default"]).unwrap();
        let session = repositories.open_session("default").unwrap();
        let result = computation.compute(session.as_ref(), &[], &BulkParams::new());
        assert!(matches!(result, Err(BulkError::Compute(_))));
    }

    #[test]
    fn test_dropped_registry() {
        let (registry, _) = registry();
        let weak = Arc::downgrade(&registry);
        drop(registry);

        let factory = migration_computation_factory(weak);
        let mut computation = factory();
        assert!(computation.start_bucket(&command("bulk")).is_err());
    }
}
