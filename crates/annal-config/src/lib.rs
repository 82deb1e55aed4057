#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for Annal.
//!
//! # Usage
//!
//! ```rust,no_run
//! use annal_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("auditing enabled: {}", resolved.config.audit.enabled);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** (`annal --config <path>`)
//! 2. **User** (`~/.annal/config.toml`)
//! 3. **System** (`/etc/annal/config.toml`)
//! 4. **Environment variables** (`ANNAL_*`), fallback only
//! 5. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! String values may reference env vars as `${VAR}`, which is the usual way
//! to supply `audit.signing_secret`.
//!
//! This crate has no dependencies on other annal crates. Conversion into
//! audit settings happens in the CLI's bridge module.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layer tracking and deep merge.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadOptions;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// See [`loader::load`] for the algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit_file: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(&LoadOptions {
            explicit_file: explicit_file.map(std::path::Path::to_path_buf),
            ..LoadOptions::default()
        })
    }

    /// Load configuration with custom discovery options.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load_with(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        loader::load(options)
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
