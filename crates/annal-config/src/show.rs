//! Source-annotated display for `config show`.

use std::fmt::{self, Write as _};

use crate::merge::FieldSources;
use crate::types::Config;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with inline comments showing source.
    Toml,
    /// JSON (for programmatic consumption).
    Json,
}

impl ResolvedConfig {
    /// Render the resolved config, optionally restricted to one section.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the section is unknown.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(section),
            ShowFormat::Json => self.show_json(section),
        }
    }

    fn section_value(&self, section: &str) -> Result<toml::Value, fmt::Error> {
        let val = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        val.as_table()
            .and_then(|t| t.get(section))
            .cloned()
            .ok_or(fmt::Error)
    }

    fn show_toml(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let toml_str = match section {
            Some(name) => {
                toml::to_string_pretty(&self.section_value(name)?).map_err(|_| fmt::Error)?
            },
            None => toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?,
        };

        let mut output = String::new();
        output.push_str("# Resolved Annal configuration\n");
        output.push_str("# Source annotations: [defaults] [system] [user] [explicit] [env]\n");

        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        // Track the current [table] header so keys resolve to dotted paths.
        let mut table = section.unwrap_or("").to_owned();
        for line in toml_str.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                table = header.to_owned();
            }
            match self.annotate_line(trimmed, &table) {
                Some(annotation) => writeln!(output, "{line}  # {annotation}")?,
                None => writeln!(output, "{line}")?,
            }
        }

        Ok(output)
    }

    fn show_json(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        match section {
            Some(name) => {
                serde_json::to_string_pretty(&self.section_value(name)?).map_err(|_| fmt::Error)
            },
            None => serde_json::to_string_pretty(&self.config).map_err(|_| fmt::Error),
        }
    }

    fn annotate_line(&self, trimmed: &str, table: &str) -> Option<String> {
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let key = trimmed.split('=').next()?.trim();
        let field_path = if table.is_empty() {
            key.to_owned()
        } else {
            format!("{table}.{key}")
        };
        self.field_sources
            .get(&field_path)
            .map(|layer| format!("[{layer}]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    fn resolved() -> ResolvedConfig {
        let mut config = Config::default();
        config.audit.signing_secret = Some("do-not-print".to_owned());
        let mut field_sources = FieldSources::new();
        field_sources.insert("audit.enabled".to_owned(), ConfigLayer::Defaults);
        field_sources.insert("logging.level".to_owned(), ConfigLayer::Environment);
        ResolvedConfig {
            config,
            field_sources,
            loaded_files: vec!["/tmp/annal.toml".to_owned()],
        }
    }

    #[test]
    fn test_show_toml_annotates_sources() {
        let out = resolved().show(ShowFormat::Toml, None).unwrap();
        assert!(out.contains("enabled = true  # [defaults]"));
        assert!(out.contains("# [environment variable]"));
        assert!(out.contains("1. /tmp/annal.toml"));
        assert!(!out.contains("do-not-print"));
    }

    #[test]
    fn test_show_json_section() {
        let out = resolved().show(ShowFormat::Json, Some("audit")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["enabled"], serde_json::Value::Bool(true));
        assert!(json.get("signing_secret").is_none());
    }

    #[test]
    fn test_unknown_section_is_error() {
        assert!(resolved().show(ShowFormat::Toml, Some("nope")).is_err());
    }
}
