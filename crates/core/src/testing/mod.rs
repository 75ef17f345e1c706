//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the bulk and cluster service
//! traits plus scripted migrators, allowing migration runs to be tested
//! without a bulk substrate.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry_core::testing::{fixtures, RecordingMigrationContext, ScriptedStatus};
//!
//! let harness = fixtures::runtime_harness(&["default"]);
//! harness.bulk.script("default", vec![ScriptedStatus::Completed { total: 3 }]).await;
//!
//! let ctx = RecordingMigrationContext::new();
//! migrator.run("rename", &ctx).await?;
//! ```

mod mock_bulk;
mod mock_cluster;
mod mock_migration;

pub use mock_bulk::{MockBulkService, ScriptedStatus};
pub use mock_cluster::{MockClusterActions, RecordedAction};
pub use mock_migration::{
    ProgressReport, RecordingMigrationContext, StaticMigration, StaticMigrator,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{MockBulkService, MockClusterActions};
    use crate::cluster::ProcessorLeases;
    use crate::migration::{
        MigrationDescriptor, MigrationRuntime, RunSettings, SqliteMigrationStatusStore,
    };
    use crate::repository::SqliteRepositoryService;

    /// Processor used by test runtimes.
    pub const TEST_PROCESSOR: &str = "bulk/migration";

    /// Collaborators of a migration runtime, kept typed for assertions.
    pub struct RuntimeHarness {
        pub repositories: Arc<SqliteRepositoryService>,
        pub bulk: Arc<MockBulkService>,
        pub cluster: Arc<MockClusterActions>,
        pub statuses: Arc<SqliteMigrationStatusStore>,
        pub runtime: MigrationRuntime,
    }

    /// Run settings polling every 10ms.
    pub fn fast_settings() -> RunSettings {
        RunSettings {
            poll_interval: Duration::from_millis(10),
            processor: TEST_PROCESSOR.to_string(),
            bucket_size: 2,
        }
    }

    /// A runtime over in-memory repositories, mock bulk and cluster services
    /// and an in-memory status store.
    pub fn runtime_harness(repositories: &[&str]) -> RuntimeHarness {
        let repositories = Arc::new(
            SqliteRepositoryService::in_memory(repositories.iter().copied())
                .expect("in-memory repositories"),
        );
        let bulk = Arc::new(MockBulkService::new());
        let cluster = Arc::new(MockClusterActions::new());
        let statuses =
            Arc::new(SqliteMigrationStatusStore::in_memory().expect("in-memory status store"));

        let runtime = MigrationRuntime {
            repositories: repositories.clone(),
            bulk: bulk.clone(),
            cluster: cluster.clone(),
            statuses: statuses.clone(),
            leases: Arc::new(ProcessorLeases::new()),
            interrupt: CancellationToken::new(),
            settings: fast_settings(),
        };

        RuntimeHarness {
            repositories,
            bulk,
            cluster,
            statuses,
            runtime,
        }
    }

    /// Three states `v0`, `v1`, `v2` with a step between each.
    pub fn versions_descriptor(id: &str) -> MigrationDescriptor {
        MigrationDescriptor::new(id, "Layout versions")
            .with_state("v0", "Initial layout")
            .with_state("v1", "Intermediate layout")
            .with_state("v2", "Final layout")
            .with_step("v0-to-v1", "v0", "v1", "First pass")
            .with_step("v1-to-v2", "v1", "v2", "Second pass")
    }
}
