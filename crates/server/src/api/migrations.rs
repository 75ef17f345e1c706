//! Migration API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use ferry_core::migration::MigrationSummary;
use ferry_core::{MigrationError, MigrationStatus};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Response for listing migrations
#[derive(Debug, Serialize)]
pub struct MigrationListResponse {
    pub migrations: Vec<MigrationSummary>,
    pub total: usize,
}

/// Response for a started step
#[derive(Debug, Serialize)]
pub struct RunStepResponse {
    pub id: String,
    pub step: String,
    pub status: MigrationStatus,
}

/// Response for a shutdown request
#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub id: String,
    /// `false` when no step of the migration was running.
    pub requested: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct MigrationErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<MigrationErrorResponse>);

fn error_response(e: MigrationError) -> ApiError {
    let status = match &e {
        MigrationError::UnknownMigration(_) | MigrationError::UnknownStep { .. } => {
            StatusCode::NOT_FOUND
        }
        MigrationError::AlreadyRunning(_) | MigrationError::InvalidStepState { .. } => {
            StatusCode::CONFLICT
        }
        MigrationError::NoDeducibleState { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(MigrationErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// List every registered migration with its status
pub async fn list_migrations(State(state): State<Arc<AppState>>) -> Json<MigrationListResponse> {
    let migrations = state.migrations().migrations().await;
    let total = migrations.len();
    Json(MigrationListResponse { migrations, total })
}

/// Get a migration by ID
pub async fn get_migration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MigrationSummary>, ApiError> {
    state
        .migrations()
        .summary(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Probe the repositories and store the deduced state
pub async fn probe_migration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MigrationStatus>, ApiError> {
    state
        .migrations()
        .probe_and_set_state(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Start a step in the background
pub async fn run_step(
    State(state): State<Arc<AppState>>,
    Path((id, step)): Path<(String, String)>,
) -> Result<(StatusCode, Json<RunStepResponse>), ApiError> {
    let service = state.migrations();
    // The step keeps running after the request completes
    let _run = service.run_step(&id, &step).await.map_err(error_response)?;
    info!("Step {} of migration {} started through the API", step, id);

    let status = service.status(&id).await.map_err(error_response)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RunStepResponse { id, step, status }),
    ))
}

/// Ask the running step of a migration to stop
pub async fn shutdown_migration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShutdownResponse>, ApiError> {
    let requested = state
        .migrations()
        .request_shutdown(&id)
        .map_err(error_response)?;
    Ok(Json(ShutdownResponse { id, requested }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                MigrationError::UnknownMigration("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                MigrationError::UnknownStep {
                    migration: "x".into(),
                    step: "s".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                MigrationError::AlreadyRunning("x".into()),
                StatusCode::CONFLICT,
            ),
            (
                MigrationError::NoDeducibleState {
                    migration: "x".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MigrationError::BulkFailed {
                    message: "boom".into(),
                    code: 500,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let message = error.to_string();
            let (status, Json(body)) = error_response(error);
            assert_eq!(status, expected);
            assert_eq!(body.error, message);
        }
    }
}
