//! Action orchestration
//!
//! The [`Orchestrator`] owns the locked configuration and the resolved
//! action list. [`Orchestrator::run`] invokes each resolved action's
//! handler in order through an [`ActionRegistry`], wrapped by optional
//! preflight and postflight hooks, and records the result in a
//! [`RunSummary`].

mod summary;

pub use summary::{
    ActionResult, ItemResult, RunSummary, Status, SummaryEntry, RUN_SUMMARY_SCHEMA_ID,
    RUN_SUMMARY_SCHEMA_VERSION,
};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::actions::{ActionError, ActionSet};
use crate::command::{CommandOutcome, CommandRunner, CommandSpec};
use crate::config::{ConfigStore, HarnessConfig};
use crate::error::{HarnessResult, EXIT_FAILURE};
use crate::logger::{LogLevel, Logger};

/// A failed action. Returned by handlers and hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub message: String,
    pub exit_code: i32,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: EXIT_FAILURE,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit code {})", self.message, self.exit_code)
    }
}

impl std::error::Error for ActionFailure {}

/// Handler and hook signature.
pub type Handler<'h> = Box<dyn FnMut(&mut ActionContext<'_>) -> Result<(), ActionFailure> + 'h>;

/// Maps action names to their handlers and hooks.
#[derive(Default)]
pub struct ActionRegistry<'h> {
    handlers: HashMap<String, Handler<'h>>,
    preflight: HashMap<String, Handler<'h>>,
    postflight: HashMap<String, Handler<'h>>,
}

impl<'h> ActionRegistry<'h> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            preflight: HashMap::new(),
            postflight: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, action: &str, handler: F) -> &mut Self
    where
        F: FnMut(&mut ActionContext<'_>) -> Result<(), ActionFailure> + 'h,
    {
        self.handlers.insert(action.to_string(), Box::new(handler));
        self
    }

    pub fn preflight<F>(&mut self, action: &str, hook: F) -> &mut Self
    where
        F: FnMut(&mut ActionContext<'_>) -> Result<(), ActionFailure> + 'h,
    {
        self.preflight.insert(action.to_string(), Box::new(hook));
        self
    }

    /// Runs only after the handler succeeded.
    pub fn postflight<F>(&mut self, action: &str, hook: F) -> &mut Self
    where
        F: FnMut(&mut ActionContext<'_>) -> Result<(), ActionFailure> + 'h,
    {
        self.postflight.insert(action.to_string(), Box::new(hook));
        self
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    fn invoke(&mut self, action: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionFailure> {
        if let Some(hook) = self.preflight.get_mut(action) {
            ctx.logger.debug(format!("Running preflight for {}", action));
            hook(ctx)?;
        }
        match self.handlers.get_mut(action) {
            Some(handler) => handler(ctx)?,
            None => return Err(ActionFailure::new(format!("no handler for {}", action))),
        }
        if let Some(hook) = self.postflight.get_mut(action) {
            ctx.logger.debug(format!("Running postflight for {}", action));
            hook(ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActionRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry").field("handlers", &names).finish()
    }
}

/// What a handler can reach while it runs.
pub struct ActionContext<'a> {
    pub action: &'a str,
    pub config: &'a ConfigStore,
    pub settings: &'a HarnessConfig,
    pub logger: &'a Logger,
    pub runner: CommandRunner<'a>,
    cwd: &'a Path,
    items: &'a mut Vec<ItemResult>,
    entries: &'a mut Vec<SummaryEntry>,
}

impl<'a> ActionContext<'a> {
    /// `<base_work_dir>/<work_dir>`
    pub fn work_dir(&self) -> PathBuf {
        self.settings.abs_work_dir(self.cwd)
    }

    pub fn base_work_dir(&self) -> PathBuf {
        self.settings.abs_base_work_dir(self.cwd)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.settings.abs_log_dir(self.cwd)
    }

    /// Add a line to the end-of-run summary.
    pub fn add_summary(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.logger.log(level.min(LogLevel::Critical), &message);
        self.entries.push(SummaryEntry { level, message });
    }

    /// Record the result of one sub-item of this action.
    pub fn record_item(&mut self, item: impl Into<String>, ok: bool) {
        self.items.push(ItemResult {
            action: self.action.to_string(),
            item: item.into(),
            ok,
        });
    }

    /// Run a command and turn a failed outcome into an [`ActionFailure`].
    pub fn run_command(&self, spec: &CommandSpec) -> Result<CommandOutcome, ActionFailure> {
        let outcome = self.runner.run(spec);
        if outcome.succeeded {
            Ok(outcome)
        } else {
            Err(ActionFailure::new(format!("command failed: {}", spec.program))
                .with_exit_code(outcome.failure_code()))
        }
    }
}

/// Drives one harness invocation.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    actions: ActionSet,
    config: ConfigStore,
    settings: HarnessConfig,
    resolved: Vec<String>,
    logger: &'a Logger,
    cwd: PathBuf,
    run_id: String,
}

impl<'a> Orchestrator<'a> {
    /// Lock `config`, read the typed settings and resolve the action list.
    pub fn new(actions: ActionSet, mut config: ConfigStore, logger: &'a Logger) -> HarnessResult<Self> {
        config.lock();
        let settings = HarnessConfig::from_store(&config)?;
        let resolved = actions.resolve(settings.default_actions.as_deref(), &settings.filters())?;
        let cwd = std::env::current_dir()?;
        Ok(Self {
            actions,
            config,
            settings,
            resolved,
            logger,
            cwd,
            run_id: ulid::Ulid::new().to_string().to_lowercase(),
        })
    }

    /// Resolve relative directories against `cwd` instead of the process
    /// working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn resolved_actions(&self) -> &[String] {
        &self.resolved
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn settings(&self) -> &HarnessConfig {
        &self.settings
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run every resolved action in order.
    ///
    /// Fails before running anything when a resolved action has no handler.
    /// A failing action stops the run unless `continue_on_failure` is set;
    /// the actions it prevented are recorded as skipped.
    pub fn run(&self, registry: &mut ActionRegistry<'_>) -> HarnessResult<RunSummary> {
        let missing: Vec<String> = self
            .resolved
            .iter()
            .filter(|a| !registry.contains(a))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ActionError::MissingHandler(missing).into());
        }

        for action in self.actions.all() {
            if !self.resolved.contains(action) {
                self.logger.debug(format!("Skipping action {}", action));
            }
        }

        let start = Instant::now();
        let mut summary = RunSummary::new(self.run_id.clone());
        let mut halted = false;

        for action in &self.resolved {
            if halted {
                summary.actions.push(ActionResult {
                    action: action.clone(),
                    status: Status::Skipped,
                    exit_code: None,
                    message: None,
                    duration_ms: 0,
                });
                continue;
            }

            self.logger.info(format!("[{}] Running {} step.", self.run_id, action));
            let action_start = Instant::now();
            let mut ctx = ActionContext {
                action,
                config: &self.config,
                settings: &self.settings,
                logger: self.logger,
                runner: CommandRunner::new(self.logger),
                cwd: &self.cwd,
                items: &mut summary.items,
                entries: &mut summary.entries,
            };
            let result = registry.invoke(action, &mut ctx);
            let duration_ms = action_start.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    self.logger.info(format!("Finished {} step (success)", action));
                    summary.actions.push(ActionResult {
                        action: action.clone(),
                        status: Status::Success,
                        exit_code: None,
                        message: None,
                        duration_ms,
                    });
                }
                Err(failure) => {
                    self.logger
                        .error(format!("Finished {} step (failed): {}", action, failure));
                    summary.actions.push(ActionResult {
                        action: action.clone(),
                        status: Status::Failed,
                        exit_code: Some(failure.exit_code),
                        message: Some(failure.message),
                        duration_ms,
                    });
                    if !self.settings.continue_on_failure {
                        halted = true;
                    }
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        summary.log(self.logger);
        Ok(summary)
    }
}
