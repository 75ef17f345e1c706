//! Admin API tests against an in-process router.

mod common;

use axum::http::StatusCode;

use common::{TestFixture, OPAQUE_MIGRATION};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["migrations"], 2);
}

#[tokio::test]
async fn test_list_migrations() {
    let fixture = TestFixture::new();
    fixture.seed_comments(3);

    let response = fixture.get("/api/v1/migrations").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 2);

    let migrations = response.body["migrations"].as_array().unwrap();
    assert_eq!(migrations[0]["id"], "comments");
    assert_eq!(migrations[0]["status"]["state"], "legacy");
    assert!(migrations[0]["status"]["error"].is_null());

    // A migration that cannot be probed is still listed, with the probe error
    assert_eq!(migrations[1]["id"], OPAQUE_MIGRATION);
    assert!(migrations[1]["status"]["state"].is_null());
    let error = migrations[1]["status"]["error"].as_str().unwrap();
    assert!(error.contains("cannot deduce"), "unexpected error: {}", error);
}

#[tokio::test]
async fn test_get_migration() {
    let fixture = TestFixture::new();
    fixture.seed_comments(1);

    let response = fixture.get("/api/v1/migrations/comments").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["description"], "Rename comment text to body");
    assert_eq!(response.body["descriptor"]["steps"][0]["id"], "rename");
    assert_eq!(response.body["descriptor"]["steps"][0]["from_state"], "legacy");
    assert_eq!(response.body["descriptor"]["steps"][0]["to_state"], "migrated");
    assert_eq!(response.body["status"]["state"], "legacy");

    let response = fixture.get("/api/v1/migrations/missing").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("unknown migration"));
}

#[tokio::test]
async fn test_probe_migration() {
    let fixture = TestFixture::new();
    fixture.seed_comments(2);

    let response = fixture.post("/api/v1/migrations/comments/probe").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["state"], "legacy");

    let response = fixture
        .post(&format!("/api/v1/migrations/{}/probe", OPAQUE_MIGRATION))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_run_step_through_api() {
    let fixture = TestFixture::new();
    fixture.seed_comments(5);

    let response = fixture
        .post("/api/v1/migrations/comments/steps/rename")
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["id"], "comments");
    assert_eq!(response.body["step"], "rename");
    assert_eq!(response.body["status"]["step"], "rename");

    fixture.wait_until_idle("comments").await;

    let response = fixture.get("/api/v1/migrations/comments").await;
    assert_eq!(response.status, StatusCode::OK);
    let status = &response.body["status"];
    assert_eq!(status["state"], "migrated");
    assert!(status["step"].is_null());
    assert!(status["error"].is_null());
    assert_eq!(status["progress_message"], "Done");
    assert_eq!(status["progress_num"], 5);
    assert_eq!(status["progress_total"], 5);
    assert_eq!(fixture.bulk.active_commands().await, 0);

    // The step no longer starts from the current state
    let response = fixture
        .post("/api/v1/migrations/comments/steps/rename")
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_run_unknown_step_or_migration() {
    let fixture = TestFixture::new();
    fixture.seed_comments(1);

    let response = fixture
        .post("/api/v1/migrations/comments/steps/unknown")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("unknown step"));

    let response = fixture
        .post("/api/v1/migrations/missing/steps/rename")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(!fixture.state.migrations().is_running("comments"));
}

#[tokio::test]
async fn test_shutdown_migration() {
    let fixture = TestFixture::new();
    fixture.seed_comments(3);

    let response = fixture.post("/api/v1/migrations/comments/shutdown").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["requested"], false);

    let response = fixture
        .post("/api/v1/migrations/comments/steps/rename")
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let response = fixture.post("/api/v1/migrations/comments/shutdown").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], "comments");
    assert_eq!(response.body["requested"], true);

    fixture.wait_until_idle("comments").await;
    let response = fixture.get("/api/v1/migrations/comments").await;
    assert_eq!(response.body["status"]["state"], "legacy");
    assert!(response.body["status"]["error"].is_null());

    let response = fixture.post("/api/v1/migrations/missing/shutdown").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);

    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("ferry_http_requests_total"));
    assert!(response.text.contains("path=\"/api/v1/health\""));
    assert!(response.text.contains("ferry_migrations_registered 2"));
}
