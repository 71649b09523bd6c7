//! Core configuration types.

use super::defaults::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Session server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub namedb: NameDbConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub names: NamesConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    /// Feature flags copied into the login response.
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::from_str(content)?;
        if config.server.login_secret.is_none() {
            config.server.login_secret = Some(ephemeral_login_secret());
            config.server.ephemeral_secret = true;
        }
        super::validate(&config).map_err(|errors| {
            ConfigError::Invalid(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Ok(config)
    }
}

/// Server identity and login authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    /// HMAC-SHA256 key for login digests. Generated at load when absent.
    #[serde(default)]
    pub login_secret: Option<String>,
    /// The secret was generated at load; digests will not survive a restart.
    #[serde(skip)]
    pub ephemeral_secret: bool,
    /// Accept a login secret shorter than the minimum (development only).
    #[serde(default)]
    pub allow_insecure_secret: bool,
}

/// Record store location.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
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

/// Login bridge / moderation ledger location.
#[derive(Debug, Clone, Deserialize)]
pub struct NameDbConfig {
    #[serde(default = "default_namedb_path")]
    pub path: String,
}

impl Default for NameDbConfig {
    fn default() -> Self {
        Self {
            path: default_namedb_path(),
        }
    }
}

/// Typed-name moderation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationConfig {
    /// Banned substrings, matched case-insensitively.
    #[serde(default)]
    pub banned: Vec<String>,
    /// Record new name requests as approved immediately.
    #[serde(default)]
    pub auto_approve: bool,
}

/// Pattern-name dictionary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamesConfig {
    /// `id*category*word` file; the built-in dictionary is used when unset.
    pub dictionary: Option<PathBuf>,
}

/// Operation engine tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationsConfig {
    /// Deadline for each store/name-db reply. Unset waits forever.
    pub reply_timeout_secs: Option<u64>,
}

impl OperationsConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_secs.map(Duration::from_secs)
    }
}

/// Login response feature flags.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_yes")]
    pub create_friends_with_chat: String,
    #[serde(default = "default_yes")]
    pub chat_code_creation_rule: String,
    #[serde(default = "default_yes")]
    pub whitelist_chat: String,
    #[serde(default = "default_access")]
    pub access: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            create_friends_with_chat: default_yes(),
            chat_code_creation_rule: default_yes(),
            whitelist_chat: default_yes(),
            access: default_access(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
