//! Environment variable fallback and `${VAR}` reference resolution.
//!
//! Env vars are **fallback**, not override. They only apply to fields that
//! no config file set; values from the embedded defaults may be replaced.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// How an env var string is coerced into a TOML value.
#[derive(Clone, Copy)]
enum Kind {
    Str,
    Bool,
    /// Comma-separated list of strings.
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "ANNAL_AUDIT_ENABLED",
        field_path: "audit.enabled",
        kind: Kind::Bool,
    },
    EnvMapping {
        var_name: "ANNAL_AUDIT_SIGNING_ENABLED",
        field_path: "audit.signing_enabled",
        kind: Kind::Bool,
    },
    EnvMapping {
        var_name: "ANNAL_AUDIT_SIGNING_SECRET",
        field_path: "audit.signing_secret",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "ANNAL_AUDIT_REDACT_FIELDS",
        field_path: "audit.redact_fields",
        kind: Kind::List,
    },
    EnvMapping {
        var_name: "ANNAL_AUDIT_STORE_PATH",
        field_path: "audit.store_path",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "ANNAL_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "ANNAL_LOG_FORMAT",
        field_path: "logging.format",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "ANNAL_LOG_DIR",
        field_path: "logging.directory",
        kind: Kind::Str,
    },
];

/// Every recognised `ANNAL_*` variable with the field it falls back into.
pub fn env_fallback_names() -> impl Iterator<Item = (&'static str, &'static str)> {
    ENV_MAPPINGS.iter().map(|m| (m.var_name, m.field_path))
}

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a boolean variable does not parse.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            let toml_val = coerce(mapping, val)?;
            set_field(merged, mapping.field_path, toml_val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, val: &str) -> ConfigResult<toml::Value> {
    match mapping.kind {
        Kind::Str => Ok(toml::Value::String(val.to_owned())),
        Kind::Bool => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "false" | "0" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected a boolean, got '{val}'"),
            }),
        },
        Kind::List => Ok(toml::Value::Array(
            val.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        )),
    }
}

/// Set a dotted field in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, val: toml::Value) {
    let (parents, leaf) = path.rsplit_once('.').unwrap_or(("", path));

    let mut current = root;
    for segment in parents.split('.').filter(|s| !s.is_empty()) {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), val);
    }
}

/// Resolve `${VAR}` references within string values in the config tree.
///
/// References that don't resolve are left as-is.
pub fn resolve_env_references<S: ::std::hash::BuildHasher>(
    val: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) {
    match val {
        toml::Value::String(s) => {
            *s = resolve_string_refs(s, env_vars);
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        toml::Value::Array(arr) => {
            for child in arr.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        _ => {},
    }
}

fn resolve_string_refs<S: ::std::hash::BuildHasher>(
    input: &str,
    env_vars: &HashMap<String, String, S>,
) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;

            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }

            if closed && !var_name.is_empty() {
                if let Some(val) = env_vars.get(&var_name) {
                    result.push_str(val);
                } else {
                    debug!(var = var_name, "unresolved env var reference in config");
                    let _ = write!(result, "${{{var_name}}}");
                }
            } else {
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_names_cover_audit_fields() {
        let names: Vec<_> = env_fallback_names().collect();
        assert!(names.contains(&("ANNAL_AUDIT_SIGNING_SECRET", "audit.signing_secret")));
        assert!(names.iter().all(|(var, _)| var.starts_with("ANNAL_")));
    }

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_apply_env_fallbacks() {
        let mut merged: toml::Value = toml::from_str("[audit]\nenabled = true").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("ANNAL_LOG_LEVEL", "debug")]);

        let count = apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        assert_eq!(count, 1);
        assert_eq!(merged["logging"]["level"].as_str().unwrap(), "debug");
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_env_fallback_skips_file_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("ANNAL_LOG_LEVEL", "debug")]);
        let count = apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        assert_eq!(count, 0);
        assert_eq!(merged["logging"]["level"].as_str().unwrap(), "warn");
    }

    #[test]
    fn test_env_fallback_replaces_defaults() {
        let mut merged: toml::Value = toml::from_str("[audit]\nsigning_enabled = false").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("audit.signing_enabled".to_owned(), ConfigLayer::Defaults);

        let env = make_env(&[("ANNAL_AUDIT_SIGNING_ENABLED", "yes")]);
        apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        assert_eq!(merged["audit"]["signing_enabled"].as_bool(), Some(true));
    }

    #[test]
    fn test_invalid_bool_is_env_error() {
        let mut merged: toml::Value = toml::from_str("").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("ANNAL_AUDIT_ENABLED", "maybe")]);

        let err = apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { ref var_name, .. } if var_name == "ANNAL_AUDIT_ENABLED"));
    }

    #[test]
    fn test_redact_fields_list() {
        let mut merged: toml::Value = toml::from_str("").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("ANNAL_AUDIT_REDACT_FIELDS", "ssn, pin ,,iban")]);

        apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        let fields: Vec<&str> = merged["audit"]["redact_fields"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(fields, vec!["ssn", "pin", "iban"]);
    }

    #[test]
    fn test_resolve_env_references() {
        let mut val: toml::Value =
            toml::from_str("[audit]\nsigning_secret = \"${MY_SECRET}\"").unwrap();
        let env = make_env(&[("MY_SECRET", "hunter2")]);
        resolve_env_references(&mut val, &env);

        assert_eq!(val["audit"]["signing_secret"].as_str().unwrap(), "hunter2");
    }

    #[test]
    fn test_resolve_env_references_unresolved() {
        let mut val: toml::Value =
            toml::from_str("[audit]\nsigning_secret = \"${MISSING_VAR}\"").unwrap();
        resolve_env_references(&mut val, &HashMap::new());

        assert_eq!(
            val["audit"]["signing_secret"].as_str().unwrap(),
            "${MISSING_VAR}"
        );
    }

    #[test]
    fn test_malformed_reference_left_alone() {
        assert_eq!(resolve_string_refs("a${b", &HashMap::new()), "a${b");
    }
}
