use std::collections::HashSet;

use super::{types::Config, ConfigError, MigratorConfig};

/// Validate configuration
///
/// Checks the values serde cannot: non-zero port and intervals, a non-empty
/// set of distinct repository names, unique migration ids and sane migrator
/// settings.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.bulk.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "bulk.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.bulk.bucket_size == 0 {
        return Err(ConfigError::ValidationError(
            "bulk.bucket_size cannot be 0".to_string(),
        ));
    }

    if config.bulk.processor.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "bulk.processor cannot be empty".to_string(),
        ));
    }

    if config.repositories.names.is_empty() {
        return Err(ConfigError::ValidationError(
            "repositories.names must list at least one repository".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for name in &config.repositories.names {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "invalid repository name: {:?}",
                name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate repository name: {}",
                name
            )));
        }
    }

    let mut ids = HashSet::new();
    for migration in &config.migrations {
        if migration.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "migration id cannot be empty".to_string(),
            ));
        }
        if !ids.insert(migration.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate migration id: {}",
                migration.id
            )));
        }

        match &migration.migrator {
            MigratorConfig::PropertyRename {
                record_type,
                from_property,
                to_property,
            } => {
                if record_type.is_empty() || from_property.is_empty() || to_property.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "migration {}: record_type, from_property and to_property are required",
                        migration.id
                    )));
                }
                if from_property == to_property {
                    return Err(ConfigError::ValidationError(format!(
                        "migration {}: from_property and to_property must differ",
                        migration.id
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn parse(toml: &str) -> Config {
        load_config_from_str(toml).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        let config = parse(
            r#"
[[migrations]]
id = "m1"
[migrations.migrator]
type = "property_rename"
record_type = "Note"
from_property = "old"
to_property = "new"
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = parse("[server]\nport = 0\n");
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let config = parse("[bulk]\npoll_interval_ms = 0\n");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_repository_fails() {
        let config = parse("[repositories]\nnames = [\"a\", \"a\"]\n");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate repository name"));
    }

    #[test]
    fn test_validate_empty_repositories_fails() {
        let config = parse("[repositories]\nnames = []\n");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_migration_fails() {
        let config = parse(
            r#"
[[migrations]]
id = "m1"
[migrations.migrator]
type = "property_rename"
record_type = "Note"
from_property = "a"
to_property = "b"

[[migrations]]
id = "m1"
[migrations.migrator]
type = "property_rename"
record_type = "Note"
from_property = "c"
to_property = "d"
"#,
        );
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate migration id"));
    }

    #[test]
    fn test_validate_same_property_fails() {
        let config = parse(
            r#"
[[migrations]]
id = "m1"
[migrations.migrator]
type = "property_rename"
record_type = "Note"
from_property = "a"
to_property = "a"
"#,
        );
        assert!(validate_config(&config).is_err());
    }
}
