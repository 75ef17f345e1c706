//! SQLite-backed migration status store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::status::{MigrationStatus, MigrationStatusStore, StatusError};

/// Statuses stored as JSON documents keyed by migration id.
pub struct SqliteMigrationStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteMigrationStatusStore {
    /// Open the store, creating the database file and table if needed.
    pub fn new(path: &Path) -> Result<Self, StatusError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StatusError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatusError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS migration_status (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decode(id: &str, json: &str) -> Result<MigrationStatus, StatusError> {
        serde_json::from_str(json).map_err(|e| StatusError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

impl MigrationStatusStore for SqliteMigrationStatusStore {
    fn get(&self, id: &str) -> Result<Option<MigrationStatus>, StatusError> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM migration_status WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| Self::decode(id, &json)).transpose()
    }

    fn put(&self, status: &MigrationStatus) -> Result<(), StatusError> {
        let json = serde_json::to_string(status).map_err(|e| StatusError::Corrupted {
            id: status.id.clone(),
            reason: e.to_string(),
        })?;

        self.conn().execute(
            r#"
            INSERT INTO migration_status (id, status, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
            "#,
            params![status.id, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<MigrationStatus>, StatusError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, status FROM migration_status ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(id, json)| Self::decode(id, json))
            .collect()
    }
}
