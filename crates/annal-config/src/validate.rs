//! Post-merge configuration validation.

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_audit(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_audit(config: &Config) -> ConfigResult<()> {
    let a = &config.audit;

    if let Some(field) = a.redact_fields.iter().find(|f| f.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "audit.redact_fields".to_owned(),
            message: format!("redaction field names must not be blank (got {field:?})"),
        });
    }

    if a.store_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "audit.store_path".to_owned(),
            message: "store_path must not be empty; omit it for an in-memory log".to_owned(),
        });
    }

    // Writes report this as a configuration error.
    if a.enabled
        && a.signing_enabled
        && a.signing_secret.as_deref().is_none_or(str::is_empty)
    {
        warn!("audit.signing_enabled is set but audit.signing_secret is missing");
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "logging.level"));
    }

    #[test]
    fn test_bad_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_blank_redact_field_rejected() {
        let mut config = Config::default();
        config.audit.redact_fields = vec!["ssn".to_owned(), "  ".to_owned()];
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "audit.redact_fields"));
    }

    #[test]
    fn test_empty_store_path_rejected() {
        let mut config = Config::default();
        config.audit.store_path = Some(String::new());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_signing_without_secret_is_not_fatal() {
        let mut config = Config::default();
        config.audit.signing_enabled = true;
        assert!(validate(&config).is_ok());
    }
}
