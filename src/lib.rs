//! tat-core - identity and visibility core of the tat messaging platform.
//!
//! Account lifecycle, topic access decisions, DM-aware presence visibility,
//! per-user contacts and favorites, and self-repair of per-user topic trees,
//! on top of a SQLite store.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod security;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use db::Database;
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use services::Services;
