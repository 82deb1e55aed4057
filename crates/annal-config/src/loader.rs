//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/annal/config.toml` (system)
//! 3. Merge `~/.annal/config.toml` (user)
//! 4. Merge an explicitly named file, if any
//! 5. Apply `ANNAL_*` env var fallbacks for fields no file set
//! 6. Resolve `${VAR}` references, deserialize into `Config`
//! 7. Validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Where the loader looks for files.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// File merged last, above the user config. Must exist.
    pub explicit_file: Option<PathBuf>,
    /// Directory used instead of `~/.annal` for the user layer.
    pub home_override: Option<PathBuf>,
    /// Skip `/etc/annal/config.toml`.
    pub skip_system: bool,
}

/// Load the configuration with layered file precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, an env var
/// cannot be coerced, or the merged configuration fails validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let mut layers: Vec<(PathBuf, ConfigLayer)> = Vec::new();
    if !options.skip_system {
        layers.push((PathBuf::from("/etc/annal/config.toml"), ConfigLayer::System));
    }
    let user_dir = match &options.home_override {
        Some(dir) => dir.clone(),
        None => home_directory()?.join(".annal"),
    };
    layers.push((user_dir.join("config.toml"), ConfigLayer::User));

    for (path, layer) in &layers {
        if let Some(overlay) = try_load_file(path)? {
            deep_merge_tracking(&mut merged, &overlay, "", layer, &mut field_sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), layer = %layer, "loaded config layer");
        }
    }

    if let Some(path) = &options.explicit_file {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::Explicit,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded explicit config");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    resolve_env_references(&mut merged, &env_vars);
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering, no env).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file, returning `None` if it doesn't exist.
///
/// A single read avoids a stat/read race.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let size = content.len() as u64;
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            path: path.display().to_string(),
            size,
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// The current user's home directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if it cannot be determined.
pub fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated(dir: &Path) -> LoadOptions {
        LoadOptions {
            explicit_file: None,
            home_override: Some(dir.to_path_buf()),
            skip_system: true,
        }
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert!(config.audit.enabled);
        assert!(!config.audit.signing_enabled);
        assert!(config.audit.redact_fields.is_empty());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_load_with_only_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load(&isolated(dir.path())).unwrap();

        assert!(resolved.config.audit.enabled);
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("audit.enabled"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_user_then_explicit_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[audit]\nsigning_enabled = true\nredact_fields = [\"ssn\"]\n",
        )
        .unwrap();
        let explicit = dir.path().join("override.toml");
        std::fs::write(&explicit, "[audit]\nredact_fields = [\"iban\"]\n").unwrap();

        let mut options = isolated(dir.path());
        options.explicit_file = Some(explicit);
        let resolved = load(&options).unwrap();

        assert!(resolved.config.audit.signing_enabled);
        assert_eq!(resolved.config.audit.redact_fields, vec!["iban"]);
        assert_eq!(
            resolved.field_sources.get("audit.signing_enabled"),
            Some(&ConfigLayer::User)
        );
        assert_eq!(
            resolved.field_sources.get("audit.redact_fields"),
            Some(&ConfigLayer::Explicit)
        );
        assert_eq!(resolved.loaded_files.len(), 2);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = isolated(dir.path());
        options.explicit_file = Some(dir.path().join("absent.toml"));
        assert!(matches!(load(&options), Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_invalid_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(matches!(
            load(&isolated(dir.path())),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[audit\n").unwrap();
        assert!(matches!(
            load(&isolated(dir.path())),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_file_single() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[audit]\nenabled = false\n").unwrap();
        let config = load_file(&path).unwrap();
        assert!(!config.audit.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        assert!(matches!(
            try_load_file(&file_path),
            Err(ConfigError::TooLarge { limit: MAX_CONFIG_FILE_SIZE, .. })
        ));
    }

    #[test]
    fn test_debug_hides_signing_secret() {
        let mut config = Config::default();
        config.audit.signing_secret = Some("hunter2-secret".to_owned());

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2-secret"));
        assert!(debug.contains("has_signing_secret: true"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2-secret"));
    }
}
