//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Shortest login secret accepted without `allow_insecure_secret`.
pub const MIN_SECRET_LEN: usize = 16;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.login_secret must be at least 16 characters, got {0}")]
    WeakLoginSecret(usize),
    #[error("server.login_secret must not be empty")]
    EmptyLoginSecret,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("names.dictionary does not exist: {0}")]
    DictionaryNotFound(String),
    #[error("operations.reply_timeout_secs must be greater than zero")]
    ZeroReplyTimeout,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    // Unset is fine: loading generates an ephemeral secret.
    if let Some(secret) = &config.server.login_secret {
        if secret.is_empty() {
            errors.push(ValidationError::EmptyLoginSecret);
        } else if secret.len() < MIN_SECRET_LEN && !config.server.allow_insecure_secret {
            errors.push(ValidationError::WeakLoginSecret(secret.len()));
        }
    }

    // Database path: parent must exist unless it is the default data directory,
    // which the store creates on first start.
    let db_path = &config.database.path;
    if db_path != ":memory:"
        && let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
        && parent != Path::new("data")
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(db_path.clone()));
    }

    if let Some(dict) = &config.names.dictionary
        && !dict.exists()
    {
        errors.push(ValidationError::DictionaryNotFound(dict.display().to_string()));
    }

    if config.operations.reply_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroReplyTimeout);
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

    fn parse_unchecked(toml_text: &str) -> Config {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn collects_every_error() {
        let config = parse_unchecked(
            r#"
            [server]
            name = ""
            login_secret = ""

            [operations]
            reply_timeout_secs = 0
            "#,
        );
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn insecure_secret_allowed_when_opted_in() {
        let config = parse_unchecked(
            "[server]\nlogin_secret = \"dev\"\nallow_insecure_secret = true\n",
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn missing_database_parent_rejected() {
        let config = parse_unchecked(
            "[server]\nlogin_secret = \"0123456789abcdef\"\n[database]\npath = \"/nonexistent/dir/x.db\"\n",
        );
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::DatabasePathInvalid(_)));
    }
}
