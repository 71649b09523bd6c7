//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and `Config::load`
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks

mod defaults;
mod types;
mod validation;

pub use types::{
    Config, ConfigError, DatabaseConfig, LogFormat, LoggingConfig, LoginConfig, ModerationConfig,
    NameDbConfig, NamesConfig, OperationsConfig, ServerConfig,
};
pub use validation::{MIN_SECRET_LEN, ValidationError, validate};
