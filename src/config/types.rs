//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::{
    default_database_path, default_exposed_host, default_exposed_port, default_exposed_scheme,
    default_queue_capacity,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Account registration and membership policy.
    #[serde(default)]
    pub accounts: AccountsConfig,
    /// Implicit access overrides for privileged users.
    #[serde(default)]
    pub access: AccessPolicy,
    /// Externally exposed URL, echoed back in credential responses.
    #[serde(default)]
    pub exposed: ExposedConfig,
    /// Side-effect queue tuning.
    #[serde(default)]
    pub effects: EffectsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Account registration policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountsConfig {
    /// Email domains allowed to register. Empty means any domain.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Derive the username from the email local-part (`first.last@corp` -> `first.last`).
    #[serde(default)]
    pub username_from_email: bool,
    /// Group every active user is expected to belong to. Empty disables the check.
    #[serde(default)]
    pub default_group: String,
}

impl AccountsConfig {
    /// Returns true if `email` ends with `@<domain>` for one allowed domain,
    /// or if no allowlist is configured.
    pub fn is_email_allowed(&self, email: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        self.allowed_domains
            .iter()
            .any(|domain| email.ends_with(&format!("@{}", domain.trim())))
    }

    /// The configured default group, if any.
    pub fn default_group(&self) -> Option<&str> {
        let group = self.default_group.trim();
        (!group.is_empty()).then_some(group)
    }
}

/// Implicit access granted to privileged users on top of topic ACLs.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AccessPolicy {
    /// Admins can read every topic.
    #[serde(default)]
    pub admin_read_all: bool,
    /// Admins can write every topic.
    #[serde(default)]
    pub admin_write_all: bool,
    /// System users can read every topic.
    #[serde(default)]
    pub system_read_all: bool,
}

/// Externally exposed URL parts. Not behavior-affecting.
#[derive(Debug, Clone, Deserialize)]
pub struct ExposedConfig {
    #[serde(default = "default_exposed_scheme")]
    pub scheme: String,
    #[serde(default = "default_exposed_host")]
    pub host: String,
    #[serde(default = "default_exposed_port")]
    pub port: String,
    #[serde(default)]
    pub path: String,
}

impl Default for ExposedConfig {
    fn default() -> Self {
        Self {
            scheme: default_exposed_scheme(),
            host: default_exposed_host(),
            port: default_exposed_port(),
            path: String::new(),
        }
    }
}

impl ExposedConfig {
    /// `scheme://host:port/path`
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// Side-effect queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EffectsConfig {
    /// Maximum number of pending mails/events before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}
