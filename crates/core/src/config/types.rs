use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    /// Declared migrations, in registration order.
    #[serde(default)]
    pub migrations: Vec<MigrationConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database holding migration statuses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ferry.db")
}

/// Record repositories the migrations operate on.
///
/// Each repository is backed by its own SQLite file `<data_dir>/<name>.db`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoriesConfig {
    #[serde(default = "default_repository_names")]
    pub names: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            names: default_repository_names(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_repository_names() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Bulk execution and polling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkConfig {
    /// Delay between two status polls of a running migration step (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Stream processor shared by all migrations.
    #[serde(default = "default_processor")]
    pub processor: String,

    /// Number of record ids handed to the computation per invocation.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: usize,

    /// A running status whose last ping is older than this is considered
    /// left over by a dead process and is reset on startup (seconds).
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Terminal bulk commands neither completed nor read for this long are
    /// forgotten (seconds).
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_processor() -> String {
    "bulk/migration".to_string()
}

fn default_bucket_size() -> usize {
    100
}

fn default_stale_after() -> u64 {
    300 // 5 minutes
}

fn default_retention() -> u64 {
    3600 // 1 hour
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            processor: default_processor(),
            bucket_size: default_bucket_size(),
            stale_after_secs: default_stale_after(),
            retention_secs: default_retention(),
        }
    }
}

impl BulkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// One declared migration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub migrator: MigratorConfig,
}

/// Migrator implementation backing a migration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigratorConfig {
    /// Moves the value of one record property to another.
    PropertyRename {
        record_type: String,
        from_property: String,
        to_property: String,
    },
}
