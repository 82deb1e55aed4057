//! CLI handlers for the `annal config` subcommand.

use std::path::Path;

use annal_config::{Config, ShowFormat, env::env_fallback_names, loader::home_directory};
use anyhow::Result;

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(explicit: Option<&Path>, format: &str, section: Option<&str>) -> Result<()> {
    let resolved = Config::load(explicit)?;

    let show_format = match format {
        "json" => ShowFormat::Json,
        _ => ShowFormat::Toml,
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Validate the current configuration. Returns whether it is valid.
pub(crate) fn validate_config(explicit: Option<&Path>) -> bool {
    match Config::load(explicit) {
        Ok(resolved) => {
            println!("{}", Theme::success("Configuration is valid."));
            if resolved.config.audit.signing_enabled
                && resolved.config.audit.signing_secret.is_none()
            {
                println!(
                    "{}",
                    Theme::warning("Signing is enabled but no secret is set; writes will fail")
                );
            }
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            true
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            false
        },
    }
}

/// Show all config file paths that are checked.
pub(crate) fn show_paths(explicit: Option<&Path>) -> Result<()> {
    let mut paths = vec![Path::new("/etc/annal/config.toml").to_path_buf()];
    paths.push(home_directory()?.join(".annal").join("config.toml"));
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in paths.iter().enumerate() {
        let status = if path.exists() { "found" } else { "not found" };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\nEnvironment variable fallbacks:");
    for (var, field) in env_fallback_names() {
        println!("  {var:<28} -> {field}");
    }

    Ok(())
}
