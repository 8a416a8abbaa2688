//! The standard release script run by the `releng` binary.
//!
//! `clobber` removes the work directory. Every other action runs the
//! commands configured for it under `action_commands`:
//!
//! ```toml
//! [config.action_commands]
//! build = [
//!   { command = "make -j8", error_list = "make" },
//!   { argv = ["python3", "check.py"], cwd = "tools", success_codes = [0, 1] },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use releng_rules::{presets, RuleSet};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::actions::{ActionError, ActionSet};
use crate::command::CommandSpec;
use crate::fs::{make_directories, recursive_delete};
use crate::harness::Script;
use crate::orchestrator::{ActionContext, ActionFailure, ActionRegistry};

pub const ALL_ACTIONS: &[&str] = &[
    "clobber",
    "pull",
    "setup",
    "build",
    "package",
    "upload",
    "run-tests",
];

pub const DEFAULT_ACTIONS: &[&str] = &["pull", "setup", "build", "package", "upload", "run-tests"];

/// Config key holding per-action command lists.
pub const ACTION_COMMANDS_KEY: &str = "action_commands";

pub fn action_set() -> Result<ActionSet, ActionError> {
    ActionSet::new(ALL_ACTIONS.iter().copied(), DEFAULT_ACTIONS.iter().copied())
}

/// The standard script. Config files are optional.
pub fn standard<'h>() -> Result<Script<'h>, ActionError> {
    Ok(Script {
        actions: action_set()?,
        defaults: default_config(),
        registry: registry(),
        config_required: false,
    })
}

/// Lowest-precedence configuration layer.
pub fn default_config() -> Map<String, Value> {
    let defaults = json!({
        "log_name": "releng",
        "work_dir": "build",
        "log_level": "info",
        "halt_on_failure": true,
        "action_commands": {},
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// One configured command.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandEntry {
    /// Reported as a summary item when set.
    pub name: Option<String>,
    /// Shell command line.
    pub command: Option<String>,
    /// Executed directly, no shell.
    pub argv: Option<Vec<String>>,
    /// Relative paths resolve against the work directory.
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Preset rule list name.
    pub error_list: Option<String>,
    /// Checked before the preset.
    #[serde(default)]
    pub error_rules: RuleSet,
    pub success_codes: Option<Vec<i32>>,
    pub halt_on_failure: Option<bool>,
}

impl CommandEntry {
    fn to_spec(&self, ctx: &ActionContext<'_>) -> Result<CommandSpec, ActionFailure> {
        let mut spec = match (&self.command, &self.argv) {
            (Some(line), None) => CommandSpec::shell(line.clone()),
            (None, Some(argv)) => CommandSpec::argv(argv.clone()),
            _ => {
                return Err(ActionFailure::new(format!(
                    "{}.{}: exactly one of 'command' or 'argv' is required",
                    ACTION_COMMANDS_KEY, ctx.action
                )))
            }
        };

        let work_dir = ctx.work_dir();
        spec = spec.cwd(match &self.cwd {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => work_dir.join(dir),
            None => work_dir,
        });
        for (key, value) in &self.env {
            spec = spec.partial_env(key.clone(), value.clone());
        }

        let mut rules = self.error_rules.clone();
        if let Some(name) = &self.error_list {
            rules.extend(presets::by_name(name).map_err(|e| ActionFailure::new(e.to_string()))?);
        }
        spec = spec
            .error_rules(rules)
            .halt_on_failure(self.halt_on_failure.unwrap_or(ctx.settings.halt_on_failure));
        if let Some(codes) = &self.success_codes {
            spec = spec.success_codes(codes.clone());
        }
        Ok(spec)
    }
}

/// Handlers for every action in [`ALL_ACTIONS`].
pub fn registry<'h>() -> ActionRegistry<'h> {
    let mut registry = ActionRegistry::new();
    registry.register("clobber", clobber);
    for action in ALL_ACTIONS.iter().filter(|a| **a != "clobber") {
        registry
            .preflight(action, ensure_work_dir)
            .register(action, run_configured_commands);
    }
    registry
}

fn clobber(ctx: &mut ActionContext<'_>) -> Result<(), ActionFailure> {
    let work_dir = ctx.work_dir();
    recursive_delete(&work_dir, ctx.logger).map_err(|e| {
        ActionFailure::new(format!("failed to delete {}: {}", work_dir.display(), e))
    })
}

fn ensure_work_dir(ctx: &mut ActionContext<'_>) -> Result<(), ActionFailure> {
    let work_dir = ctx.work_dir();
    make_directories(&work_dir, ctx.logger).map_err(|e| {
        ActionFailure::new(format!("failed to create {}: {}", work_dir.display(), e))
    })
}

fn run_configured_commands(ctx: &mut ActionContext<'_>) -> Result<(), ActionFailure> {
    let entries = configured_commands(ctx)?;
    if entries.is_empty() {
        ctx.logger
            .info(format!("No commands configured for {}; nothing to do", ctx.action));
        return Ok(());
    }

    for entry in &entries {
        let spec = entry.to_spec(ctx)?;
        let result = ctx.run_command(&spec);
        if let Some(name) = &entry.name {
            ctx.record_item(name.clone(), result.is_ok());
        }
        result?;
    }
    Ok(())
}

fn configured_commands(ctx: &ActionContext<'_>) -> Result<Vec<CommandEntry>, ActionFailure> {
    let value = match ctx
        .config
        .get(ACTION_COMMANDS_KEY)
        .and_then(|commands| commands.get(ctx.action))
    {
        Some(value) => value.clone(),
        None => return Ok(Vec::new()),
    };
    serde_json::from_value(value).map_err(|e| {
        ActionFailure::new(format!(
            "invalid {}.{}: {}",
            ACTION_COMMANDS_KEY, ctx.action, e
        ))
    })
}
