//! Layered configuration with provenance
//!
//! Layers are applied lowest precedence first:
//! 1. Script defaults
//! 2. Config files, in the order given
//! 3. Command-line overrides
//!
//! Later layers overwrite identical keys. Keys registered as accumulating
//! (see [`ConfigLayers::accumulate`]) are appended to instead.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::file::{resolve_file, ConfigFile, DEFAULT_CONFIG_KEY};
use super::{ConfigError, ConfigStore};

/// Where a layer came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Defaults,
    File,
    Cli,
}

/// One contributing layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for defaults/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for defaults/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    pub values: Map<String, Value>,
}

/// Collects configuration layers and merges them into a [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct ConfigLayers {
    search_path: Vec<PathBuf>,
    config_key: String,
    accumulating: Vec<String>,
    sources: Vec<ConfigSource>,
}

impl ConfigLayers {
    /// Start an empty stack that resolves file names against `search_path`.
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            config_key: DEFAULT_CONFIG_KEY.to_string(),
            accumulating: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Table name holding the mapping in TOML files.
    pub fn with_config_key(mut self, key: impl Into<String>) -> Self {
        self.config_key = key.into();
        self
    }

    /// Keys whose list values accumulate across layers.
    pub fn accumulate<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accumulating.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn add_defaults(&mut self, values: Map<String, Value>) -> &mut Self {
        self.sources.push(ConfigSource {
            origin: ConfigOrigin::Defaults,
            path: None,
            digest: None,
            values,
        });
        self
    }

    /// Resolve and load a required config file.
    pub fn add_file(&mut self, name: &str) -> Result<&mut Self, ConfigError> {
        let path = resolve_file(name, &self.search_path)?;
        self.push_file(ConfigFile::load(&path, &self.config_key)?);
        Ok(self)
    }

    /// Load a config file if it can be found. Returns whether it was.
    /// A file that exists but fails to parse is still an error.
    pub fn add_optional_file(&mut self, name: &str) -> Result<bool, ConfigError> {
        match resolve_file(name, &self.search_path) {
            Ok(path) => {
                self.push_file(ConfigFile::load(&path, &self.config_key)?);
                Ok(true)
            }
            Err(ConfigError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn add_cli(&mut self, values: Map<String, Value>) -> &mut Self {
        self.sources.push(ConfigSource {
            origin: ConfigOrigin::Cli,
            path: None,
            digest: None,
            values,
        });
        self
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    fn push_file(&mut self, file: ConfigFile) {
        self.sources.push(ConfigSource {
            origin: ConfigOrigin::File,
            path: Some(file.path.display().to_string()),
            digest: Some(file.digest),
            values: file.values,
        });
    }

    /// Merge all layers into an unlocked store.
    pub fn merge(&self) -> Result<ConfigStore, ConfigError> {
        let mut store = ConfigStore::new();
        for source in &self.sources {
            let mut plain = Map::new();
            for (key, value) in &source.values {
                if self.accumulating.iter().any(|k| k == key) {
                    store.extend(key, into_items(key, value.clone())?)?;
                } else {
                    plain.insert(key.clone(), value.clone());
                }
            }
            if !plain.is_empty() {
                store.merge(plain, false)?;
            }
        }
        Ok(store)
    }

    /// Every layer with its provenance, for `--dump-config-hierarchy`.
    pub fn hierarchy(&self) -> Value {
        serde_json::to_value(&self.sources).unwrap_or(Value::Null)
    }
}

fn into_items(key: &str, value: Value) -> Result<Vec<Value>, ConfigError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::String(_) => Ok(vec![value]),
        _ => Err(ConfigError::NotAList(key.to_string())),
    }
}
