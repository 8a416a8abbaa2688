//! Lockable key-value configuration store.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::ConfigError;

/// The merged configuration for one harness invocation.
///
/// Mutable through [`merge`](Self::merge), [`set`](Self::set) and
/// [`extend`](Self::extend) until [`lock`](Self::lock) is called; every
/// mutator fails with [`ConfigError::Locked`] afterwards and leaves the
/// contents untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    values: Map<String, Value>,
    locked: bool,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
            locked: false,
        }
    }

    /// Merge `mapping` into the store.
    ///
    /// Replaces the whole store when it is empty or `overwrite` is set;
    /// otherwise only the keys present in `mapping` change. Nested values
    /// are replaced wholesale.
    pub fn merge(&mut self, mapping: Map<String, Value>, overwrite: bool) -> Result<(), ConfigError> {
        self.check_unlocked(mapping.keys().next().map(String::as_str).unwrap_or("<merge>"))?;
        if overwrite || self.values.is_empty() {
            self.values = mapping;
        } else {
            for (key, value) in mapping {
                self.values.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.check_unlocked(key)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Append `items` to the list stored under `key`, creating it if absent.
    pub fn extend(&mut self, key: &str, items: Vec<Value>) -> Result<(), ConfigError> {
        self.check_unlocked(key)?;
        match self.values.get_mut(key) {
            Some(Value::Array(existing)) => existing.extend(items),
            Some(Value::Null) | None => {
                self.values.insert(key.to_string(), Value::Array(items));
            }
            Some(_) => return Err(ConfigError::NotAList(key.to_string())),
        }
        Ok(())
    }

    /// Make the store permanently read-only. Idempotent.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value under `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.values.get(key).unwrap_or(default)
    }

    /// Value under `key`, failing when absent.
    pub fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Deserialize the value under `key`. `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Deserialize the whole store into a typed view.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(self.to_value()).map_err(|e| ConfigError::InvalidValue {
            key: "<root>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pretty JSON rendering of the contents.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&self.values)
            .map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Write the contents to `path` as pretty JSON.
    pub fn dump(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let json = self.to_pretty_json()?;
        fs::write(path, json + "\n").map_err(|e| ConfigError::Io(e.to_string()))
    }

    fn check_unlocked(&self, key: &str) -> Result<(), ConfigError> {
        if self.locked {
            Err(ConfigError::Locked(key.to_string()))
        } else {
            Ok(())
        }
    }
}
