//! Common test utilities for API testing.
//!
//! This module provides a test fixture that creates an in-process server
//! wired over in-memory repositories and the local bulk service, enabling
//! API tests that run real migrations without external infrastructure.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ferry_core::{
    load_config_from_str,
    migration::MIGRATION_ACTION,
    testing::{fixtures, StaticMigrator},
    with_transaction, LocalBulkService, LocalClusterActions, MigrationRuntime,
    MigrationService, MigratorHandle, MigratorRegistry, ProcessorLeases, Record,
    RepositoryError, RunSettings, SqliteMigrationStatusStore, SqliteRepositoryService,
};
use ferry_server::api::create_router;
use ferry_server::state::AppState;

const CONFIG: &str = r#"
[repositories]
names = ["default"]

[bulk]
poll_interval_ms = 10
bucket_size = 4

[[migrations]]
id = "comments"
description = "Rename comment text to body"

[migrations.migrator]
type = "property_rename"
record_type = "Comment"
from_property = "text"
to_property = "body"
"#;

/// Id of the scripted migration whose state cannot be deduced.
pub const OPAQUE_MIGRATION: &str = "layout";

/// Test fixture for API testing.
///
/// Registers two migrations: `comments`, a property rename running on the
/// local bulk service, and `layout`, a scripted migrator without a
/// deducible state.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() {
///     let fixture = TestFixture::new();
///     let response = fixture.get("/api/v1/health").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub repositories: Arc<SqliteRepositoryService>,
    pub bulk: Arc<LocalBulkService>,
}

impl TestFixture {
    pub fn new() -> Self {
        let config = load_config_from_str(CONFIG).expect("valid config");

        let repositories = Arc::new(
            SqliteRepositoryService::in_memory(config.repositories.names.iter())
                .expect("in-memory repositories"),
        );
        let statuses =
            Arc::new(SqliteMigrationStatusStore::in_memory().expect("in-memory status store"));
        let bulk = Arc::new(LocalBulkService::new(repositories.clone()));
        let cluster = Arc::new(LocalClusterActions::new(bulk.clone()));
        let interrupt = CancellationToken::new();
        let settings = RunSettings::from(&config.bulk);

        let runtime = MigrationRuntime {
            repositories: repositories.clone(),
            bulk: bulk.clone(),
            cluster,
            statuses: statuses.clone(),
            leases: Arc::new(ProcessorLeases::new()),
            interrupt: interrupt.clone(),
            settings: settings.clone(),
        };

        let mut registry = MigratorRegistry::from_config(&config.migrations, &runtime)
            .expect("Failed to build registry");
        registry
            .register(MigratorHandle::Direct(Arc::new(StaticMigrator::new(
                fixtures::versions_descriptor(OPAQUE_MIGRATION),
            ))))
            .expect("Failed to register scripted migrator");

        let service = MigrationService::new(Arc::new(registry), statuses, interrupt);
        bulk.register_action(
            MIGRATION_ACTION,
            &settings.processor,
            service.computation_factory(),
        );

        let state = Arc::new(AppState::new(config, service));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            repositories,
            bulk,
        }
    }

    /// Save `count` comments still carrying the legacy property.
    pub fn seed_comments(&self, count: usize) {
        with_transaction(self.repositories.as_ref(), "default", |session| {
            for i in 0..count {
                let record = Record::new(format!("comment-{:02}", i), "Comment")
                    .with_property("text", format!("comment {}", i));
                session.save(&record)?;
            }
            Ok::<_, RepositoryError>(())
        })
        .expect("Failed to seed comments");
    }

    /// Wait until no step of `id` runs any more.
    pub async fn wait_until_idle(&self, id: &str) {
        let service = self.state.migrations();
        tokio::time::timeout(Duration::from_secs(10), async {
            while service.is_running(id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("migration step did not finish");
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Response captured from the router.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// JSON body, `Null` when empty or not JSON.
    pub body: Value,
    pub text: String,
}
