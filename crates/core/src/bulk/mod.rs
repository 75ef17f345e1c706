//! Bulk execution: scroll a query over one repository and feed the matching
//! record ids, bucket by bucket, to a registered computation.
//!
//! The [`BulkService`] trait is the boundary the migration engine depends on.
//! [`LocalBulkService`] runs commands in-process on tokio tasks; its stream
//! processors are started and stopped through the cluster action service.

mod error;
mod local;
mod traits;
mod types;

pub use error::BulkError;
pub use local::LocalBulkService;
pub use traits::{BulkService, Computation, ComputationFactory};
pub use types::{BulkCommand, BulkParams, BulkState, BulkStatus};
