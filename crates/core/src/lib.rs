pub mod bulk;
pub mod cluster;
pub mod config;
pub mod metrics;
pub mod migration;
pub mod repository;
pub mod testing;

pub use bulk::{
    BulkCommand, BulkError, BulkParams, BulkService, BulkState, BulkStatus, Computation,
    ComputationFactory, LocalBulkService,
};
pub use cluster::{
    ClusterActionService, ClusterError, LocalClusterActions, ProcessorControl, ProcessorLeases,
    START_CONSUMERS_ACTION, STOP_CONSUMERS_ACTION,
};
pub use config::{
    load_config, load_config_from_str, validate_config, BulkConfig, Config, ConfigError,
    MigrationConfig, MigratorConfig,
};
pub use migration::{
    BulkMigration, BulkMigrator, MigrationContext, MigrationDescriptor, MigrationError,
    MigrationRegistry, MigrationRuntime, MigrationService, MigrationStatus,
    MigrationStatusStore, Migrator, MigratorHandle, MigratorRegistry, RunSettings,
    SqliteMigrationStatusStore,
};
pub use repository::{
    with_transaction, Record, RepositoryError, RepositoryService, ScrollQuery, Session,
    SqliteRepositoryService,
};
