//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("database.path is required")]
    MissingDatabasePath,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("accounts.allowed_domains contains an empty entry")]
    EmptyAllowedDomain,
    #[error("accounts.allowed_domains entry must not contain '@': {0}")]
    InvalidAllowedDomain(String),
    #[error("accounts.default_group must not contain '/' or ',': {0}")]
    InvalidDefaultGroup(String),
    #[error("effects.queue_capacity must be greater than zero")]
    ZeroQueueCapacity,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Database path validation
    let db_path = config.database.path.trim();
    if db_path.is_empty() {
        errors.push(ValidationError::MissingDatabasePath);
    } else if db_path != ":memory:"
        && let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(db_path.to_string()));
    }

    for domain in &config.accounts.allowed_domains {
        let domain = domain.trim();
        if domain.is_empty() {
            errors.push(ValidationError::EmptyAllowedDomain);
        } else if domain.contains('@') {
            errors.push(ValidationError::InvalidAllowedDomain(domain.to_string()));
        }
    }

    if let Some(group) = config.accounts.default_group()
        && (group.contains('/') || group.contains(','))
    {
        errors.push(ValidationError::InvalidDefaultGroup(group.to_string()));
    }

    if config.effects.queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.database.path = "/definitely/not/here/tat.db".into();
        config.accounts.allowed_domains = vec!["".into(), "a@b.com".into()];
        config.accounts.default_group = "a/b".into();
        config.effects.queue_capacity = 0;

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ValidationError::DatabasePathInvalid(_)));
    }

    #[test]
    fn test_memory_database_is_valid() {
        let mut config = Config::default();
        config.database.path = ":memory:".into();
        assert!(validate(&config).is_ok());
    }
}
