//! Record repositories and transactional sessions.
//!
//! Migrations never touch storage directly: probes and computations receive a
//! [`Session`] opened on one named repository, and every unit of work runs
//! inside [`with_transaction`], which commits on success and rolls back on
//! failure.

mod error;
mod sqlite;
mod traits;
mod types;

pub use error::RepositoryError;
pub use sqlite::SqliteRepositoryService;
pub use traits::{with_transaction, RepositoryService, Session};
pub use types::{Record, ScrollQuery};
