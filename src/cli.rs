//! Command-line surface shared by every script.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{Map, Value};

use crate::config::ConfigError;
use crate::logger::LogLevel;

/// Options common to all release scripts.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "releng")]
#[command(about = "Release engineering action harness", version)]
pub struct HarnessArgs {
    /// Config file to layer in (repeatable, applied in order)
    #[arg(long = "config-file", visible_alias = "cfg", short = 'c', value_name = "PATH")]
    pub config_files: Vec<String>,

    /// Config file to layer in when it can be found
    #[arg(long = "opt-cfg", value_name = "PATH")]
    pub opt_config_files: Vec<String>,

    /// Extra directory to search for config files (searched first)
    #[arg(long = "config-dir", value_name = "DIR")]
    pub config_dirs: Vec<PathBuf>,

    /// Override a config key; VALUE is parsed as JSON, else taken as a string
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Work directory, relative to the base work directory
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<String>,

    /// Base work directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub base_work_dir: Option<PathBuf>,

    /// Log directory (default: <base_work_dir>/logs)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Base name for log files
    #[arg(long, value_name = "NAME")]
    pub log_name: Option<String>,

    /// Minimum level to log (debug, info, warning, error, critical, fatal)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Don't log to the console
    #[arg(short, long)]
    pub quiet: bool,

    /// Append to existing log files instead of truncating them
    #[arg(long)]
    pub append_to_log: bool,

    /// Also write one log file per level
    #[arg(long, conflicts_with = "simple_log")]
    pub multi_log: bool,

    /// Write only the aggregate log file
    #[arg(long)]
    pub simple_log: bool,

    /// Print the available and default actions, then exit
    #[arg(long)]
    pub list_actions: bool,

    /// Run only this action (repeatable; replaces the defaults)
    #[arg(long = "action", value_name = "NAME")]
    pub actions: Vec<String>,

    /// Run this action in addition to the defaults (repeatable)
    #[arg(long = "add-action", value_name = "NAME")]
    pub add_actions: Vec<String>,

    /// Don't run this action (repeatable)
    #[arg(long = "no-action", value_name = "NAME")]
    pub no_actions: Vec<String>,

    /// Keep running actions after one fails
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Print the merged configuration as JSON, then exit
    #[arg(long)]
    pub dump_config: bool,

    /// Print every configuration layer with its provenance, then exit
    #[arg(long)]
    pub dump_config_hierarchy: bool,
}

impl HarnessArgs {
    /// The command-line configuration layer.
    ///
    /// `--set` pairs are applied first so dedicated flags win over them.
    pub fn overrides(&self) -> Result<Map<String, Value>, ConfigError> {
        let mut map = Map::new();
        for pair in &self.set {
            let (key, value) = parse_override(pair)?;
            map.insert(key, value);
        }

        if let Some(dir) = &self.work_dir {
            map.insert("work_dir".into(), Value::String(dir.clone()));
        }
        if let Some(dir) = &self.base_work_dir {
            map.insert("base_work_dir".into(), path_value(dir));
        }
        if let Some(dir) = &self.log_dir {
            map.insert("log_dir".into(), path_value(dir));
        }
        if let Some(name) = &self.log_name {
            map.insert("log_name".into(), Value::String(name.clone()));
        }
        if let Some(level) = self.log_level {
            map.insert("log_level".into(), Value::String(level.as_str().to_string()));
        }
        if self.quiet {
            map.insert("console_output".into(), Value::Bool(false));
        }
        if self.append_to_log {
            map.insert("append_to_log".into(), Value::Bool(true));
        }
        if self.multi_log {
            map.insert("multi_log".into(), Value::Bool(true));
        }
        if self.simple_log {
            map.insert("multi_log".into(), Value::Bool(false));
        }
        if self.continue_on_failure {
            map.insert("continue_on_failure".into(), Value::Bool(true));
        }
        for (key, names) in [
            ("actions", &self.actions),
            ("add_actions", &self.add_actions),
            ("no_actions", &self.no_actions),
        ] {
            if !names.is_empty() {
                map.insert(
                    key.into(),
                    Value::Array(names.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        Ok(map)
    }
}

fn path_value(path: &std::path::Path) -> Value {
    Value::String(path.display().to_string())
}

/// Split `KEY=VALUE`. VALUE is JSON when it parses as JSON.
pub fn parse_override(pair: &str) -> Result<(String, Value), ConfigError> {
    let (key, raw) = pair
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::InvalidOverride(pair.to_string()))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

/// Rewrite per-action sugar flags into their long forms.
///
/// For each name in `all_actions`, `--NAME` and `--only-NAME` become
/// `--action NAME` and `--no-NAME` becomes `--no-action NAME`. Anything
/// after a bare `--` is left alone.
pub fn expand_action_flags<S: AsRef<str>>(argv: Vec<String>, all_actions: &[S]) -> Vec<String> {
    let mut out = Vec::with_capacity(argv.len());
    let mut passthrough = false;
    for (index, arg) in argv.into_iter().enumerate() {
        if index == 0 || passthrough {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let expanded = arg.strip_prefix("--").and_then(|flag| {
            all_actions.iter().map(AsRef::as_ref).find_map(|name| {
                if flag == name || flag.strip_prefix("only-") == Some(name) {
                    Some(("--action", name))
                } else if flag.strip_prefix("no-") == Some(name) {
                    Some(("--no-action", name))
                } else {
                    None
                }
            })
        });
        match expanded {
            Some((long, name)) => {
                out.push(long.to_string());
                out.push(name.to_string());
            }
            None => out.push(arg),
        }
    }
    out
}
