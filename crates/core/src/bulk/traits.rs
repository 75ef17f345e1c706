//! Trait definitions for the bulk module.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::BulkError;
use super::types::{BulkCommand, BulkParams, BulkStatus};
use crate::repository::Session;

/// Asynchronous bulk execution service.
#[async_trait]
pub trait BulkService: Send + Sync {
    /// Submit a command and return its bulk id immediately.
    async fn submit(&self, command: BulkCommand) -> Result<String, BulkError>;

    /// Current status of a submitted command.
    async fn status(&self, bulk_id: &str) -> Result<BulkStatus, BulkError>;

    /// Ask a command to stop. Returns the resulting status.
    async fn abort(&self, bulk_id: &str) -> Result<BulkStatus, BulkError>;
}

/// Per-bucket processing logic of a bulk action.
///
/// One instance serves many buckets, possibly of different commands, one
/// bucket at a time. The caller owns the transaction around each bucket.
pub trait Computation: Send {
    /// Called before every bucket with the command it belongs to.
    fn start_bucket(&mut self, command: &BulkCommand) -> Result<(), BulkError>;

    fn compute(
        &mut self,
        session: &dyn Session,
        ids: &[String],
        params: &BulkParams,
    ) -> Result<(), BulkError>;
}

/// Creates computations for an action.
pub type ComputationFactory = Arc<dyn Fn() -> Box<dyn Computation> + Send + Sync>;
