//! Default value functions for configuration.

use rand::Rng;
use rand::distributions::Alphanumeric;

pub fn default_server_name() -> String {
    "sessiond".to_string()
}

/// Random secret used when none is configured. Lives for one process only.
pub fn ephemeral_login_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

// =============================================================================
// Storage Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "data/records.db".to_string()
}

pub fn default_namedb_path() -> String {
    "data/account-bridge.redb".to_string()
}

// =============================================================================
// Login Response Defaults
// =============================================================================

pub fn default_yes() -> String {
    "YES".to_string()
}

pub fn default_access() -> String {
    "FULL".to_string()
}
