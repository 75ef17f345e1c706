use ferry_core::{Config, MigrationService};

/// Shared application state
pub struct AppState {
    config: Config,
    migrations: MigrationService,
}

impl AppState {
    pub fn new(config: Config, migrations: MigrationService) -> Self {
        Self { config, migrations }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn migrations(&self) -> &MigrationService {
        &self.migrations
    }
}
