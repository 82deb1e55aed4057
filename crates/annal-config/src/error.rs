//! Errors raised while loading configuration.

use std::io;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("cannot read config file {path}: {source}")]
    ReadError {
        /// File that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A config file, or the merged result, is not valid TOML for [`Config`](crate::Config).
    #[error("invalid TOML in {path}: {source}")]
    ParseError {
        /// File that failed to parse, or `<merged config>`.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A config file is larger than the loader accepts.
    #[error("config file {path} is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Offending file.
        path: String,
        /// Its size in bytes.
        size: u64,
        /// The accepted maximum.
        limit: u64,
    },

    /// A field holds a value outside its allowed set.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the field, e.g. `logging.level`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// An `ANNAL_*` fallback could not be coerced.
    #[error("environment variable {var_name}: {message}")]
    EnvError {
        /// Name of the variable.
        var_name: String,
        /// What is wrong with its value.
        message: String,
    },

    /// The user layer needs a home directory and none was found.
    #[error("cannot determine home directory")]
    NoHomeDir,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
