//! SQLite-backed repositories.

use std::cell::Cell;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::error::RepositoryError;
use super::traits::{RepositoryService, Session};
use super::types::{Record, ScrollQuery};

/// One SQLite database per repository name.
pub struct SqliteRepositoryService {
    repositories: Vec<SqliteRepository>,
}

struct SqliteRepository {
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteRepositoryService {
    /// Open (creating if needed) `<data_dir>/<name>.db` for every name.
    pub fn open(data_dir: &Path, names: &[String]) -> Result<Self, RepositoryError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            RepositoryError::Database(format!(
                "cannot create data dir {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        let mut repositories = Vec::with_capacity(names.len());
        for name in names {
            let conn = Connection::open(data_dir.join(format!("{}.db", name)))?;
            Self::initialize_schema(&conn)?;
            repositories.push(SqliteRepository {
                name: name.clone(),
                conn: Mutex::new(conn),
            });
        }
        Ok(Self { repositories })
    }

    /// In-memory repositories (useful for testing).
    pub fn in_memory<I, S>(names: I) -> Result<Self, RepositoryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut repositories = Vec::new();
        for name in names {
            let conn = Connection::open_in_memory()?;
            Self::initialize_schema(&conn)?;
            repositories.push(SqliteRepository {
                name: name.into(),
                conn: Mutex::new(conn),
            });
        }
        Ok(Self { repositories })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RepositoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                properties TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type);
            "#,
        )?;
        Ok(())
    }
}

impl RepositoryService for SqliteRepositoryService {
    fn repository_names(&self) -> Vec<String> {
        self.repositories.iter().map(|r| r.name.clone()).collect()
    }

    fn open_session(&self, repository: &str) -> Result<Box<dyn Session + '_>, RepositoryError> {
        let repo = self
            .repositories
            .iter()
            .find(|r| r.name == repository)
            .ok_or_else(|| RepositoryError::UnknownRepository(repository.to_string()))?;

        let conn = repo
            .conn
            .lock()
            .map_err(|_| RepositoryError::Database("connection lock poisoned".to_string()))?;

        Ok(Box::new(SqliteSession {
            repository: &repo.name,
            conn,
            in_transaction: Cell::new(false),
        }))
    }
}

/// Holds the repository connection for its whole lifetime.
struct SqliteSession<'a> {
    repository: &'a str,
    conn: MutexGuard<'a, Connection>,
    in_transaction: Cell<bool>,
}

impl SqliteSession<'_> {
    fn scan(&self, query: &ScrollQuery) -> Result<Vec<Record>, RepositoryError> {
        let rows: Vec<(String, String, String)> = match query.record_type {
            Some(ref record_type) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, record_type, properties FROM records WHERE record_type = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![record_type], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                rows.collect::<Result<_, _>>()?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id, record_type, properties FROM records ORDER BY id")?;
                let rows =
                    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                rows.collect::<Result<_, _>>()?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for (id, record_type, properties) in rows {
            let record = decode_record(id, record_type, &properties)?;
            if query.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn decode_record(
    id: String,
    record_type: String,
    properties: &str,
) -> Result<Record, RepositoryError> {
    let properties: Map<String, Value> =
        serde_json::from_str(properties).map_err(|e| RepositoryError::CorruptedRecord {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    Ok(Record {
        id,
        record_type,
        properties,
    })
}

impl Session for SqliteSession<'_> {
    fn repository(&self) -> &str {
        self.repository
    }

    fn query_ids(&self, query: &ScrollQuery) -> Result<Vec<String>, RepositoryError> {
        Ok(self.scan(query)?.into_iter().map(|r| r.id).collect())
    }

    fn count(&self, query: &ScrollQuery) -> Result<u64, RepositoryError> {
        Ok(self.scan(query)?.len() as u64)
    }

    fn get(&self, id: &str) -> Result<Option<Record>, RepositoryError> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT id, record_type, properties FROM records WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(id, record_type, properties)| decode_record(id, record_type, &properties))
            .transpose()
    }

    fn save(&self, record: &Record) -> Result<(), RepositoryError> {
        let properties = serde_json::to_string(&record.properties)
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        self.conn.execute(
            r#"
            INSERT INTO records (id, record_type, properties, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                record_type = excluded.record_type,
                properties = excluded.properties,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id,
                record.record_type,
                properties,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn begin(&self) -> Result<(), RepositoryError> {
        if self.in_transaction.get() {
            return Err(RepositoryError::Transaction(
                "transaction already active".to_string(),
            ));
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction.set(true);
        Ok(())
    }

    fn commit(&self) -> Result<(), RepositoryError> {
        if !self.in_transaction.get() {
            return Err(RepositoryError::Transaction(
                "no active transaction".to_string(),
            ));
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction.set(false);
        Ok(())
    }

    fn rollback(&self) -> Result<(), RepositoryError> {
        if !self.in_transaction.get() {
            return Ok(());
        }
        self.in_transaction.set(false);
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.in_transaction.get() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(
                    "Failed to roll back abandoned transaction on {}: {}",
                    self.repository,
                    e
                );
            }
        }
    }
}
