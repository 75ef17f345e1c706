use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, migrations};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Migrations
        .route("/migrations", get(migrations::list_migrations))
        .route("/migrations/{id}", get(migrations::get_migration))
        .route("/migrations/{id}/probe", post(migrations::probe_migration))
        .route("/migrations/{id}/steps/{step}", post(migrations::run_step))
        .route(
            "/migrations/{id}/shutdown",
            post(migrations::shutdown_migration),
        )
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(state.clone());

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
}
