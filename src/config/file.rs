//! Config file lookup and parsing.
//!
//! Two formats are accepted:
//! - `.json`: the document itself is the mapping
//! - `.toml`: the mapping lives in a top-level table (default key `config`)

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::ConfigError;

/// Default top-level table holding the mapping in TOML files.
pub const DEFAULT_CONFIG_KEY: &str = "config";

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format implied by the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(ConfigFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A parsed config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    /// SHA-256 of the raw file bytes, hex encoded.
    pub digest: String,
    pub values: Map<String, Value>,
}

impl ConfigFile {
    /// Read and parse `path`. `key` names the TOML table holding the mapping.
    pub fn load(path: &Path, key: &str) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            reason: format!("invalid UTF-8: {}", e),
        })?;

        let values = match format {
            ConfigFormat::Json => parse_json(path, &contents)?,
            ConfigFormat::Toml => parse_toml(path, &contents, key)?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            digest,
            values,
        })
    }
}

/// Locate a config file.
///
/// `name` is used as-is when it exists; otherwise each directory of
/// `search_path` is probed in order and the first hit wins.
pub fn resolve_file(name: &str, search_path: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    let direct = Path::new(name);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    if direct.is_relative() {
        for dir in search_path {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(ConfigError::NotFound {
        name: name.to_string(),
        searched: search_path.iter().map(|p| p.display().to_string()).collect(),
    })
}

fn parse_json(path: &Path, contents: &str) -> Result<Map<String, Value>, ConfigError> {
    let value: Value = serde_json::from_str(contents).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        reason: format!("JSON parse error: {}", e),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::Malformed {
            path: path.display().to_string(),
            reason: format!("top level must be an object, found {}", json_type(&other)),
        }),
    }
}

fn parse_toml(path: &Path, contents: &str, key: &str) -> Result<Map<String, Value>, ConfigError> {
    let mut table: toml::Table = toml::from_str(contents).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        reason: format!("TOML parse error: {}", e),
    })?;

    match table.remove(key) {
        Some(toml::Value::Table(inner)) => Ok(inner
            .into_iter()
            .map(|(k, v)| (k, toml_to_json(v)))
            .collect()),
        Some(_) => Err(ConfigError::Malformed {
            path: path.display().to_string(),
            reason: format!("'{}' must be a table", key),
        }),
        None => Err(ConfigError::Malformed {
            path: path.display().to_string(),
            reason: format!("missing top-level '{}' table", key),
        }),
    }
}

/// Convert a TOML value to its JSON equivalent.
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "b.json", r#"{"work_dir": "obj", "locales": ["de"]}"#);
        let file = ConfigFile::load(&path, DEFAULT_CONFIG_KEY).unwrap();
        assert_eq!(Value::Object(file.values), json!({"work_dir": "obj", "locales": ["de"]}));
        assert_eq!(file.digest.len(), 64);
    }

    #[test]
    fn test_json_top_level_must_be_object() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "list.json", "[1, 2]");
        let err = ConfigFile::load(&path, DEFAULT_CONFIG_KEY).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_load_toml_config_table() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "linux.toml",
            r#"
other = "ignored"

[config]
work_dir = "build"
default_actions = ["pull", "build"]

[config.env]
MOZ_OBJDIR = "obj"
"#,
        );
        let file = ConfigFile::load(&path, DEFAULT_CONFIG_KEY).unwrap();
        assert_eq!(
            Value::Object(file.values),
            json!({
                "work_dir": "build",
                "default_actions": ["pull", "build"],
                "env": {"MOZ_OBJDIR": "obj"}
            })
        );
    }

    #[test]
    fn test_toml_custom_key() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "c.toml", "[job]\nx = 1\n");
        let file = ConfigFile::load(&path, "job").unwrap();
        assert_eq!(file.values.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_toml_without_config_table() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "c.toml", "work_dir = \"build\"\n");
        let err = ConfigFile::load(&path, DEFAULT_CONFIG_KEY).unwrap_err();
        assert!(err.to_string().contains("missing top-level 'config' table"));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "c.py", "config = {}\n");
        assert!(matches!(
            ConfigFile::load(&path, DEFAULT_CONFIG_KEY),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_direct_path() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "direct.json", "{}");
        let resolved = resolve_file(path.to_str().unwrap(), &[]).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_resolve_search_path_first_hit_wins() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&first).unwrap();
        let expected = write(&second, "builds/linux.json", "{}");
        write(dir.path(), "third/builds/linux.json", "{}");

        let search = vec![first, second, dir.path().join("third")];
        let resolved = resolve_file("builds/linux.json", &search).unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_resolve_not_found_lists_search_path() {
        let search = vec![PathBuf::from("/nonexistent/a"), PathBuf::from("/nonexistent/b")];
        let err = resolve_file("missing.json", &search).unwrap_err();
        match err {
            ConfigError::NotFound { name, searched } => {
                assert_eq!(name, "missing.json");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_toml_to_json_scalars() {
        assert_eq!(toml_to_json(toml::Value::Integer(3)), json!(3));
        assert_eq!(toml_to_json(toml::Value::Boolean(true)), json!(true));
        assert_eq!(toml_to_json(toml::Value::Float(1.5)), json!(1.5));
    }
}
