//! Trait definitions for the repository module.

use tracing::warn;

use super::error::RepositoryError;
use super::types::{Record, ScrollQuery};

/// A session on one repository.
///
/// Sessions are synchronous and not shared between threads; open one per
/// unit of work.
pub trait Session {
    /// Name of the repository this session is bound to.
    fn repository(&self) -> &str;

    /// Ids of the records matching the query, in id order.
    fn query_ids(&self, query: &ScrollQuery) -> Result<Vec<String>, RepositoryError>;

    /// Number of records matching the query.
    fn count(&self, query: &ScrollQuery) -> Result<u64, RepositoryError>;

    fn get(&self, id: &str) -> Result<Option<Record>, RepositoryError>;

    /// Insert or replace a record.
    fn save(&self, record: &Record) -> Result<(), RepositoryError>;

    fn begin(&self) -> Result<(), RepositoryError>;

    fn commit(&self) -> Result<(), RepositoryError>;

    fn rollback(&self) -> Result<(), RepositoryError>;
}

/// Enumerates repositories and opens sessions on them.
pub trait RepositoryService: Send + Sync {
    /// Registered repository names, in registration order.
    fn repository_names(&self) -> Vec<String>;

    fn open_session(&self, repository: &str) -> Result<Box<dyn Session + '_>, RepositoryError>;
}

/// Run `f` in a transaction on `repository`.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A session
/// dropped mid-transaction (panic) rolls back on its own.
pub fn with_transaction<T, E, F>(
    service: &dyn RepositoryService,
    repository: &str,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&dyn Session) -> Result<T, E>,
    E: From<RepositoryError>,
{
    let session = service.open_session(repository)?;
    session.begin()?;

    match f(session.as_ref()) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = session.rollback() {
                warn!(
                    "Failed to roll back transaction on repository {}: {}",
                    repository, rollback_err
                );
            }
            Err(e)
        }
    }
}
