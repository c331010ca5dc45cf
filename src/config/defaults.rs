//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "tat.db".to_string()
}

// =============================================================================
// Exposed URL Defaults
// =============================================================================

pub fn default_exposed_scheme() -> String {
    "http".to_string()
}

pub fn default_exposed_host() -> String {
    "localhost".to_string()
}

pub fn default_exposed_port() -> String {
    "8080".to_string()
}

// =============================================================================
// Effects Defaults
// =============================================================================

pub fn default_queue_capacity() -> usize {
    1024
}
