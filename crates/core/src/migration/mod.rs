//! Resumable bulk migrations.
//!
//! A migration is described by a [`MigrationDescriptor`]: an ordered list of
//! states its data goes through and the steps moving it from one state to the
//! next. A [`BulkMigrator`] runs a step as one bulk command per repository and
//! waits for all of them; [`MigrationComputation`] is the bulk-side half that
//! forwards each bucket of records to the migration's logic.
//!
//! [`MigrationService`] hosts the registered migrators, keeps their status
//! and launches steps in the background.

mod builtin;
mod computation;
mod context;
mod descriptor;
mod dispatcher;
mod error;
mod migrator;
mod orchestrator;
mod prober;
mod registry;
mod service;
mod status;
mod status_sqlite;

pub use builtin::{PropertyRenameMigration, LEGACY_STATE, MIGRATED_STATE, RENAME_STEP};
pub use computation::{migration_computation_factory, MigrationComputation};
pub use context::{MigrationContext, StatusMigrationContext};
pub use descriptor::{MigrationDescriptor, StateDescriptor, StepDescriptor};
pub use dispatcher::{
    MIGRATION_ACTION, PARAM_MIGRATION_ID, PARAM_MIGRATION_STEP, SYSTEM_USERNAME,
};
pub use error::MigrationError;
pub use migrator::{
    BulkMigration, BulkMigrator, MigrationRuntime, Migrator, MigratorHandle, RunSettings,
    StatusChangeCallback,
};
pub use orchestrator::{RunOutcome, RunProgress, DONE_MESSAGE, MIGRATING_MESSAGE};
pub use prober::deduce_state;
pub use registry::{MigrationRegistry, MigratorRegistry};
pub use service::{MigrationService, MigrationSummary};
pub use status::{MigrationStatus, MigrationStatusStore, StatusError};
pub use status_sqlite::SqliteMigrationStatusStore;
