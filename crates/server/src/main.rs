use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_core::{
    load_config, migration::MIGRATION_ACTION, validate_config, LocalBulkService,
    LocalClusterActions, MigrationRuntime, MigrationService, MigratorRegistry, ProcessorLeases,
    RunSettings, SqliteMigrationStatusStore, SqliteRepositoryService,
};
use ferry_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("FERRY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Repositories: {:?} in {:?}",
        config.repositories.names, config.repositories.data_dir
    );

    // Record repositories
    let repositories = Arc::new(
        SqliteRepositoryService::open(&config.repositories.data_dir, &config.repositories.names)
            .context("Failed to open repositories")?,
    );

    // Migration status store
    let statuses = Arc::new(
        SqliteMigrationStatusStore::new(&config.database.path)
            .context("Failed to create migration status store")?,
    );
    info!("Migration status store initialized");

    // Bulk substrate and cluster actions
    let bulk = Arc::new(
        LocalBulkService::new(repositories.clone()).with_retention(config.bulk.retention()),
    );
    let cluster = Arc::new(LocalClusterActions::new(bulk.clone()));
    let interrupt = CancellationToken::new();
    let settings = RunSettings::from(&config.bulk);

    let runtime = MigrationRuntime {
        repositories,
        bulk: bulk.clone(),
        cluster,
        statuses: statuses.clone(),
        leases: Arc::new(ProcessorLeases::new()),
        interrupt: interrupt.clone(),
        settings: settings.clone(),
    };

    // Migrations
    let registry = MigratorRegistry::from_config(&config.migrations, &runtime)
        .context("Failed to register migrations")?;
    info!("Registered {} migrations: {:?}", registry.len(), registry.ids());

    let service = MigrationService::new(Arc::new(registry), statuses, interrupt);
    bulk.register_action(
        MIGRATION_ACTION,
        &settings.processor,
        service.computation_factory(),
    );

    match service.recover_stale(config.bulk.stale_after()) {
        Ok(0) => {}
        Ok(recovered) => warn!("Cleared {} stale migration steps", recovered),
        Err(e) => error!("Failed to clear stale migration steps: {}", e),
    }

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), service));

    // Create router
    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Interrupt running steps
    info!("Server shutting down...");
    state.migrations().shutdown();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
