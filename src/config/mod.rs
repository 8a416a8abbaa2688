//! Configuration resolution
//!
//! Layers script defaults, config files and command-line overrides into one
//! [`ConfigStore`], which is locked before any action runs. [`HarnessConfig`]
//! is the typed view of the keys the harness itself reads.

mod file;
mod layers;
mod settings;
mod store;

pub use file::{resolve_file, toml_to_json, ConfigFile, ConfigFormat, DEFAULT_CONFIG_KEY};
pub use layers::{ConfigLayers, ConfigOrigin, ConfigSource};
pub use settings::HarnessConfig;
pub use store::ConfigStore;

use thiserror::Error;

/// Configuration errors. All are fatal at the point of detection.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("configuration is locked; cannot modify '{0}'")]
    Locked(String),

    #[error("'{0}' is not a list")]
    NotAList(String),

    #[error("missing required config key '{0}'")]
    MissingKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("config file '{name}' not found (searched: {})", .searched.join(", "))]
    NotFound { name: String, searched: Vec<String> },

    #[error("unsupported config file format: {0} (expected .json or .toml)")]
    UnsupportedFormat(String),

    #[error("malformed config file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("invalid override '{0}' (expected KEY=VALUE)")]
    InvalidOverride(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
