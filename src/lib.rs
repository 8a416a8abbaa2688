//! Releng Lane - release engineering action harness
//!
//! A script declares a fixed vocabulary of named actions (clobber, pull,
//! build, ...). The harness layers configuration from script defaults,
//! config files and command-line overrides into one locked store, resolves
//! which actions run, and drives each through its handler. Handlers run
//! external commands whose output is classified line by line against
//! error rules from the `releng-rules` crate.

pub mod actions;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod fs;
pub mod harness;
pub mod logger;
pub mod orchestrator;
pub mod script;

pub use actions::{ActionError, ActionFilters, ActionSet};
pub use command::{CommandOutcome, CommandRunner, CommandSpec};
pub use config::{ConfigError, ConfigLayers, ConfigStore, HarnessConfig};
pub use error::{HarnessError, HarnessResult};
pub use logger::{LogLevel, Logger, LoggerConfig};
pub use orchestrator::{ActionContext, ActionFailure, ActionRegistry, Orchestrator, RunSummary};
pub use releng_rules::{ErrorRule, Pattern, RuleSet, Severity};
