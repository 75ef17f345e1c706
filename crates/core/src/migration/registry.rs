//! Typed registry of migrators, built at startup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::builtin::PropertyRenameMigration;
use super::error::MigrationError;
use super::migrator::{BulkMigrator, MigrationRuntime, MigratorHandle};
use crate::config::{MigrationConfig, MigratorConfig};

/// Lookup of migrators by migration id.
pub trait MigrationRegistry: Send + Sync {
    fn migrator(&self, id: &str) -> Option<MigratorHandle>;
}

/// Migrators in registration order.
#[derive(Clone, Default)]
pub struct MigratorRegistry {
    handles: Vec<MigratorHandle>,
    index: HashMap<String, usize>,
}

impl MigratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured migration as an invalidating bulk migrator.
    pub fn from_config(
        migrations: &[MigrationConfig],
        runtime: &MigrationRuntime,
    ) -> Result<Self, MigrationError> {
        let mut registry = Self::new();

        for migration in migrations {
            let migrator = match &migration.migrator {
                MigratorConfig::PropertyRename {
                    record_type,
                    from_property,
                    to_property,
                } => {
                    let rename = PropertyRenameMigration::new(
                        record_type.clone(),
                        from_property.clone(),
                        to_property.clone(),
                    );
                    let descriptor = rename.descriptor(&migration.id, &migration.description);
                    BulkMigrator::new(descriptor, Arc::new(rename), runtime.clone())?
                        .with_status_listener(Arc::new(|id: &str| {
                            debug!("Migration {} status changed", id);
                        }))
                }
            };
            registry.register(MigratorHandle::Invalidating(Arc::new(migrator)))?;
        }

        info!("Registered {} migrations", registry.len());
        Ok(registry)
    }

    /// Add a migrator. Its descriptor must be valid and its id unused.
    pub fn register(&mut self, handle: MigratorHandle) -> Result<(), MigrationError> {
        let descriptor = handle.descriptor();
        descriptor.validate()?;

        if self.index.contains_key(&descriptor.id) {
            return Err(MigrationError::InvalidDescriptor {
                migration: descriptor.id.clone(),
                reason: "migration registered twice".to_string(),
            });
        }

        self.index
            .insert(descriptor.id.clone(), self.handles.len());
        self.handles.push(handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&MigratorHandle> {
        self.index.get(id).map(|&i| &self.handles[i])
    }

    /// Registered handles, in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &MigratorHandle> {
        self.handles.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.handles
            .iter()
            .map(|h| h.descriptor().id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl MigrationRegistry for MigratorRegistry {
    fn migrator(&self, id: &str) -> Option<MigratorHandle> {
        self.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationDescriptor;
    use crate::testing::{fixtures, StaticMigrator};

    fn descriptor(id: &str) -> MigrationDescriptor {
        MigrationDescriptor::new(id, "").with_state("a", "")
    }

    #[test]
    fn test_registration_order() {
        let mut registry = MigratorRegistry::new();
        for id in ["c", "a", "b"] {
            registry
                .register(MigratorHandle::Direct(Arc::new(StaticMigrator::new(
                    descriptor(id),
                ))))
                .unwrap();
        }
        assert_eq!(registry.ids(), vec!["c", "a", "b"]);
        assert!(registry.migrator("a").is_some());
        assert!(registry.migrator("z").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = MigratorRegistry::new();
        let handle = MigratorHandle::Direct(Arc::new(StaticMigrator::new(descriptor("a"))));
        registry.register(handle.clone()).unwrap();
        let err = registry.register(handle).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let mut registry = MigratorRegistry::new();
        let handle = MigratorHandle::Direct(Arc::new(StaticMigrator::new(
            MigrationDescriptor::new("empty", ""),
        )));
        assert!(registry.register(handle).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_config_builds_invalidating_bulk_migrators() {
        let harness = fixtures::runtime_harness(&["default"]);
        let config = crate::config::load_config_from_str(
            r#"
            [[migrations]]
            id = "comments"
            description = "Move comment text"

            [migrations.migrator]
            type = "property_rename"
            record_type = "Comment"
            from_property = "text"
            to_property = "body"
            "#,
        )
        .unwrap();

        let registry = MigratorRegistry::from_config(&config.migrations, &harness.runtime).unwrap();
        let handle = registry.migrator("comments").unwrap();
        assert!(matches!(handle, MigratorHandle::Invalidating(_)));
        assert!(handle.inner().bulk_migration().is_some());
        assert_eq!(handle.descriptor().description, "Move comment text");
        assert!(handle.descriptor().step("rename").is_some());
    }
}
