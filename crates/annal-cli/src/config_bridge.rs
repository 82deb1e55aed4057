//! Bridge from `annal_config::Config` to audit and telemetry types.

use std::path::PathBuf;

use annal_audit::{AuditSettings, SigningKey};
use annal_config::Config;
use annal_telemetry::{LogConfig, LogFormat};

/// Store directory used when `audit.store_path` is unset.
const DEFAULT_STORE_DIR: &str = "audit";

/// Convert config to [`AuditSettings`].
#[must_use]
pub fn to_audit_settings(cfg: &Config) -> AuditSettings {
    AuditSettings {
        enabled: cfg.audit.enabled,
        signing_enabled: cfg.audit.signing_enabled,
        signing_secret: cfg.audit.signing_secret.clone(),
        redact_fields: cfg.audit.redact_fields.clone(),
    }
}

/// Convert config to [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);
    if let Some(dir) = &cfg.logging.directory {
        log_config = log_config.with_file_logging(dir);
    }
    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Where the persistent store lives.
///
/// `override_path` wins, then `audit.store_path`, then `~/.annal/audit`.
///
/// # Errors
///
/// Returns an error if no path is configured and the home directory cannot
/// be determined.
pub fn store_path(cfg: &Config, override_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    if let Some(path) = &cfg.audit.store_path {
        return Ok(PathBuf::from(path));
    }
    let base = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(base.home_dir().join(".annal").join(DEFAULT_STORE_DIR))
}

/// Key for checking signatures, if a secret is configured.
///
/// Unlike the write path this does not look at `audit.signing_enabled`:
/// records signed earlier stay checkable after signing is turned off.
///
/// # Errors
///
/// Returns an error if the configured secret is rejected.
pub fn verification_key(cfg: &Config) -> anyhow::Result<Option<SigningKey>> {
    match cfg.audit.signing_secret.as_deref() {
        Some(secret) if !secret.is_empty() => Ok(Some(SigningKey::new(secret)?)),
        _ => Ok(None),
    }
}
