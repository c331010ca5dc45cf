//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, AccountsConfig, AccessPolicy)
//! - [`defaults`]: serde default value functions
//! - [`validation`]: Startup validation of a loaded configuration

mod defaults;
mod types;
pub mod validation;

pub use types::{
    AccessPolicy, AccountsConfig, Config, ConfigError, DatabaseConfig, EffectsConfig,
    ExposedConfig,
};
