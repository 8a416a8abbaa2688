//! Typed view of the keys the harness reads itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ConfigError, ConfigStore};
use crate::actions::ActionFilters;
use crate::logger::{LogLevel, LoggerConfig};

/// Harness settings deserialized from the locked [`ConfigStore`].
///
/// Keys not named here land in `extra`, untouched, for the domain script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub log_level: LogLevel,
    pub log_name: String,
    /// Defaults to `<base_work_dir>/logs`.
    pub log_dir: Option<PathBuf>,
    pub work_dir: String,
    /// Defaults to the current directory.
    pub base_work_dir: Option<PathBuf>,
    pub console_output: bool,
    pub append_to_log: bool,
    pub multi_log: bool,
    pub halt_on_failure: bool,
    pub continue_on_failure: bool,
    pub default_actions: Option<Vec<String>>,
    pub actions: Vec<String>,
    pub add_actions: Vec<String>,
    pub no_actions: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_name: "log".to_string(),
            log_dir: None,
            work_dir: "build".to_string(),
            base_work_dir: None,
            console_output: true,
            append_to_log: false,
            multi_log: false,
            halt_on_failure: true,
            continue_on_failure: false,
            default_actions: None,
            actions: Vec::new(),
            add_actions: Vec::new(),
            no_actions: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl HarnessConfig {
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        store.typed()
    }

    /// Absolute base directory; relative values resolve against `cwd`.
    pub fn abs_base_work_dir(&self, cwd: &Path) -> PathBuf {
        match &self.base_work_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        }
    }

    /// `<base_work_dir>/<work_dir>`
    pub fn abs_work_dir(&self, cwd: &Path) -> PathBuf {
        self.abs_base_work_dir(cwd).join(&self.work_dir)
    }

    pub fn abs_log_dir(&self, cwd: &Path) -> PathBuf {
        match &self.log_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => self.abs_base_work_dir(cwd).join("logs"),
        }
    }

    pub fn logger_config(&self, cwd: &Path) -> LoggerConfig {
        LoggerConfig {
            level: self.log_level,
            console: self.console_output,
            log_dir: Some(self.abs_log_dir(cwd)),
            log_name: self.log_name.clone(),
            multi_log: self.multi_log,
            append: self.append_to_log,
            halt_on_fatal: self.halt_on_failure,
        }
    }

    /// The command-line style action filters carried in configuration.
    pub fn filters(&self) -> ActionFilters {
        ActionFilters {
            actions: self.actions.clone(),
            add_actions: self.add_actions.clone(),
            no_actions: self.no_actions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> ConfigStore {
        match value {
            Value::Object(map) => ConfigStore::from_map(map),
            other => panic!("not an object: {}", other),
        }
    }

    #[test]
    fn test_defaults_from_empty_store() {
        let config = HarnessConfig::from_store(&ConfigStore::new()).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_typed_fields_and_extra_bag() {
        let config = HarnessConfig::from_store(&store(json!({
            "log_level": "debug",
            "multi_log": true,
            "default_actions": ["pull", "build"],
            "no_actions": ["upload"],
            "locales": ["de", "fr"],
            "repo": {"url": "https://hg.example.org/central"}
        })))
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.multi_log);
        assert_eq!(config.default_actions, Some(vec!["pull".into(), "build".into()]));
        assert_eq!(config.filters().no_actions, vec!["upload".to_string()]);
        assert_eq!(config.extra.get("locales"), Some(&json!(["de", "fr"])));
        assert!(config.extra.contains_key("repo"));
        assert!(!config.extra.contains_key("log_level"));
    }

    #[test]
    fn test_wrong_type_is_invalid_value() {
        let err = HarnessConfig::from_store(&store(json!({"multi_log": "yes"}))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_directory_layout() {
        let cwd = Path::new("/srv/job");
        let mut config = HarnessConfig::default();
        assert_eq!(config.abs_work_dir(cwd), PathBuf::from("/srv/job/build"));
        assert_eq!(config.abs_log_dir(cwd), PathBuf::from("/srv/job/logs"));

        config.base_work_dir = Some(PathBuf::from("/builds"));
        config.work_dir = "obj".to_string();
        config.log_dir = Some(PathBuf::from("out/logs"));
        assert_eq!(config.abs_work_dir(cwd), PathBuf::from("/builds/obj"));
        assert_eq!(config.abs_log_dir(cwd), PathBuf::from("/srv/job/out/logs"));
    }

    #[test]
    fn test_logger_config_follows_settings() {
        let config = HarnessConfig {
            log_level: LogLevel::Warning,
            console_output: false,
            halt_on_failure: false,
            ..HarnessConfig::default()
        };
        let logger = config.logger_config(Path::new("/tmp/x"));
        assert_eq!(logger.level, LogLevel::Warning);
        assert!(!logger.console);
        assert!(!logger.halt_on_fatal);
        assert_eq!(logger.log_dir, Some(PathBuf::from("/tmp/x/logs")));
    }
}
