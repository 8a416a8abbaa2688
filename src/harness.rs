//! Script bootstrap
//!
//! [`run`] takes a [`Script`] and the raw argv through every phase of one
//! invocation:
//! 1. Expand per-action sugar flags and parse [`HarnessArgs`]
//! 2. Layer defaults, config files and overrides; lock the result
//! 3. Handle the early exits (`--dump-config*`, `--list-actions`)
//! 4. Build the logger and write `localconfig.json`
//! 5. Resolve actions and run them through the [`Orchestrator`]
//!
//! Errors before the logger exists go to stderr. Afterwards they go through
//! [`Logger::fatal`].

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{Map, Value};

use crate::actions::ActionSet;
use crate::cli::{expand_action_flags, HarnessArgs};
use crate::config::{ConfigLayers, ConfigStore, HarnessConfig};
use crate::error::{HarnessError, HarnessResult, EXIT_SUCCESS, EXIT_USAGE};
use crate::logger::Logger;
use crate::orchestrator::{ActionRegistry, Orchestrator};

/// Keys whose list values accumulate across layers instead of replacing.
pub const ACCUMULATING_KEYS: &[&str] = &["add_actions", "no_actions"];

/// File name of the merged configuration dump in the log directory.
pub const LOCALCONFIG_NAME: &str = "localconfig.json";

/// File name of the run summary in the log directory.
pub const RUN_SUMMARY_NAME: &str = "run_summary.json";

/// A domain script: its action vocabulary, defaults and handlers.
pub struct Script<'h> {
    pub actions: ActionSet,
    pub defaults: Map<String, Value>,
    pub registry: ActionRegistry<'h>,
    /// Fail with a usage error when no `--config-file` is given.
    pub config_required: bool,
}

/// Config search path: `--config-dir`s, `./configs`, then `configs/` next
/// to the running executable.
pub fn search_path(config_dirs: &[PathBuf], cwd: &Path) -> Vec<PathBuf> {
    let mut path = config_dirs.to_vec();
    path.push(cwd.join("configs"));
    if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        path.push(dir.join("configs"));
    }
    path
}

/// Everything resolved before the logger is built.
struct Prepared {
    args: HarnessArgs,
    layers: ConfigLayers,
    store: ConfigStore,
    skipped_optional: Vec<String>,
}

/// Run `script` with `argv` (program name first). Returns the exit code.
///
/// `--list-actions` and fatal errors with a halting logger end the
/// process from inside this call.
pub fn run(mut script: Script<'_>, argv: Vec<String>) -> i32 {
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("releng: cannot determine current directory: {}", e);
            return HarnessError::Io(e).exit_code();
        }
    };

    let argv = expand_action_flags(argv, script.actions.all());
    let args = match HarnessArgs::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
        }
    };

    let prepared = match prepare(&script, args, &cwd) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("releng: {}", e);
            return e.exit_code();
        }
    };

    match early_exit(&script, &prepared) {
        Ok(Some(code)) => return code,
        Ok(None) => {}
        Err(e) => {
            eprintln!("releng: {}", e);
            return e.exit_code();
        }
    }

    let settings = match HarnessConfig::from_store(&prepared.store) {
        Ok(settings) => settings,
        Err(e) => {
            let e = HarnessError::from(e);
            eprintln!("releng: {}", e);
            return e.exit_code();
        }
    };
    let logger = match Logger::new(&settings.logger_config(&cwd)) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("releng: cannot open log files: {}", e);
            return HarnessError::Io(e).exit_code();
        }
    };

    match execute(&mut script, prepared, &settings, &logger, &cwd) {
        Ok(code) => {
            logger.flush();
            code
        }
        Err(e) => {
            let code = e.exit_code();
            logger.fatal(e.to_string(), code);
            logger.flush();
            code
        }
    }
}

fn prepare(script: &Script<'_>, args: HarnessArgs, cwd: &Path) -> HarnessResult<Prepared> {
    if script.config_required && args.config_files.is_empty() {
        return Err(HarnessError::Usage(
            "at least one --config-file is required".to_string(),
        ));
    }

    let mut layers = ConfigLayers::new(search_path(&args.config_dirs, cwd))
        .accumulate(ACCUMULATING_KEYS.iter().copied());
    layers.add_defaults(script.defaults.clone());
    for name in &args.config_files {
        layers.add_file(name)?;
    }
    let mut skipped_optional = Vec::new();
    for name in &args.opt_config_files {
        if !layers.add_optional_file(name)? {
            skipped_optional.push(name.clone());
        }
    }
    layers.add_cli(args.overrides()?);

    let mut store = layers.merge()?;
    store.lock();
    Ok(Prepared {
        args,
        layers,
        store,
        skipped_optional,
    })
}

/// `Some(code)` when the invocation ends before any action runs.
fn early_exit(script: &Script<'_>, prepared: &Prepared) -> HarnessResult<Option<i32>> {
    if prepared.args.dump_config_hierarchy {
        println!("{}", serde_json::to_string_pretty(&prepared.layers.hierarchy())?);
        return Ok(Some(EXIT_SUCCESS));
    }
    if prepared.args.dump_config {
        println!("{}", prepared.store.to_pretty_json()?);
        return Ok(Some(EXIT_SUCCESS));
    }
    if prepared.args.list_actions {
        let defaults: Option<Vec<String>> = prepared.store.get_as("default_actions")?;
        script.actions.list_actions(defaults.as_deref());
    }
    Ok(None)
}

fn execute(
    script: &mut Script<'_>,
    prepared: Prepared,
    settings: &HarnessConfig,
    logger: &Logger,
    cwd: &Path,
) -> HarnessResult<i32> {
    for name in &prepared.skipped_optional {
        logger.info(format!("Optional config file {} not found; skipping", name));
    }
    for source in prepared.layers.sources() {
        if let Some(path) = &source.path {
            logger.debug(format!("Loaded config file {}", path));
        }
    }

    let log_dir = settings.abs_log_dir(cwd);
    prepared.store.dump(&log_dir.join(LOCALCONFIG_NAME))?;

    let orchestrator =
        Orchestrator::new(script.actions.clone(), prepared.store, logger)?.with_cwd(cwd);
    logger.info(format!(
        "Actions to run: {}",
        orchestrator.resolved_actions().join(", ")
    ));

    let summary = orchestrator.run(&mut script.registry)?;
    if let Err(e) = summary.write_to_file(&log_dir.join(RUN_SUMMARY_NAME)) {
        logger.warning(format!("Failed to write {}: {}", RUN_SUMMARY_NAME, e));
    }
    Ok(summary.exit_code())
}
