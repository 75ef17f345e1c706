//! Migrations available from configuration.

use tracing::debug;

use super::descriptor::MigrationDescriptor;
use super::error::MigrationError;
use super::migrator::BulkMigration;
use crate::bulk::BulkParams;
use crate::repository::{ScrollQuery, Session};

/// State of records still using the old property.
pub const LEGACY_STATE: &str = "legacy";

/// State of records using the new property.
pub const MIGRATED_STATE: &str = "migrated";

/// The single step of a property rename.
pub const RENAME_STEP: &str = "rename";

/// Moves a property of every record of one type to a new name.
#[derive(Debug, Clone)]
pub struct PropertyRenameMigration {
    record_type: String,
    from_property: String,
    to_property: String,
}

impl PropertyRenameMigration {
    pub fn new(
        record_type: impl Into<String>,
        from_property: impl Into<String>,
        to_property: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            from_property: from_property.into(),
            to_property: to_property.into(),
        }
    }

    /// Descriptor of a rename registered under `id`.
    pub fn descriptor(&self, id: &str, description: &str) -> MigrationDescriptor {
        let description = if description.is_empty() {
            format!(
                "Rename {}.{} to {}",
                self.record_type, self.from_property, self.to_property
            )
        } else {
            description.to_string()
        };

        MigrationDescriptor::new(id, description)
            .with_state(
                LEGACY_STATE,
                format!("{} records store {}", self.record_type, self.from_property),
            )
            .with_state(
                MIGRATED_STATE,
                format!("{} records store {}", self.record_type, self.to_property),
            )
            .with_step(
                RENAME_STEP,
                LEGACY_STATE,
                MIGRATED_STATE,
                format!("Move {} to {}", self.from_property, self.to_property),
            )
    }

    fn of_type(&self) -> ScrollQuery {
        ScrollQuery::new().of_type(self.record_type.as_str())
    }
}

impl BulkMigration for PropertyRenameMigration {
    fn probe_session(&self, session: &dyn Session) -> Result<Option<String>, MigrationError> {
        let legacy = session.count(&self.of_type().with_property(self.from_property.as_str()))?;
        if legacy > 0 {
            return Ok(Some(LEGACY_STATE.to_string()));
        }
        if session.count(&self.of_type())? > 0 {
            return Ok(Some(MIGRATED_STATE.to_string()));
        }
        Ok(None)
    }

    fn scroll_query(&self, _step: &str) -> ScrollQuery {
        self.of_type().with_property(self.from_property.as_str())
    }

    fn compute(
        &self,
        session: &dyn Session,
        ids: &[String],
        _params: &BulkParams,
    ) -> Result<(), MigrationError> {
        let mut renamed = 0;
        for id in ids {
            let Some(mut record) = session.get(id)? else {
                continue;
            };
            let Some(value) = record.remove_property(&self.from_property) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            record.set_property(self.to_property.as_str(), value);
            session.save(&record)?;
            renamed += 1;
        }

        debug!(
            "Renamed {} to {} on {}/{} records",
            self.from_property,
            self.to_property,
            renamed,
            ids.len()
        );
        Ok(())
    }
}
