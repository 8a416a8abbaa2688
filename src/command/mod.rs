//! External command execution
//!
//! [`CommandRunner::run`] streams a child's stdout and stderr line by line,
//! classifies each line against the command's [`RuleSet`], emits it through the
//! [`Logger`] at the classified level and folds the verdicts into a
//! [`CommandOutcome`]. A run fails when its exit code is not one of the
//! success codes or when any line was classified `error` or above.
//!
//! [`CommandRunner::get_output`] captures output instead of classifying it.
//!
//! Nothing here retries. Failures either return to the caller or, with
//! `halt_on_failure`, go through [`Logger::fatal`].

mod output;
mod stream;

pub use output::CapturedOutput;
pub use stream::{LineStream, OutputLine, Stream};

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

use releng_rules::{OutputTally, RuleSet, Severity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EXIT_FAILURE;
use crate::logger::{LogLevel, Logger};

/// Why a command could not be started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("can't run command in non-existent directory '{0}'")]
    MissingCwd(PathBuf),

    #[error("executable '{0}' not found on PATH")]
    MissingExecutable(String),

    #[error("failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),
}

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Program {
    /// Executed directly, no shell.
    Argv(Vec<String>),
    /// Passed to the platform shell.
    Shell(String),
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Argv(argv) => write!(f, "{:?}", argv),
            Program::Shell(line) => f.write_str(line),
        }
    }
}

/// A command invocation, built up with chained setters.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: Program,
    pub cwd: Option<PathBuf>,
    /// Replaces the inherited environment entirely.
    pub env: Option<BTreeMap<String, String>>,
    /// Overlaid on whichever environment the child gets.
    pub partial_env: BTreeMap<String, String>,
    pub error_rules: RuleSet,
    pub halt_on_failure: bool,
    pub success_codes: Vec<i32>,
}

impl CommandSpec {
    fn from_program(program: Program) -> Self {
        Self {
            program,
            cwd: None,
            env: None,
            partial_env: BTreeMap::new(),
            error_rules: RuleSet::empty(),
            halt_on_failure: false,
            success_codes: vec![0],
        }
    }

    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_program(Program::Argv(argv.into_iter().map(Into::into).collect()))
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Self::from_program(Program::Shell(line.into()))
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn partial_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.partial_env.insert(key.into(), value.into());
        self
    }

    pub fn error_rules(mut self, rules: RuleSet) -> Self {
        self.error_rules = rules;
        self
    }

    pub fn halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    pub fn success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }

    /// `PATH` the child will search: the overlay, then the replacement
    /// environment, then the inherited one.
    fn child_path(&self) -> Option<OsString> {
        self.partial_env
            .get("PATH")
            .or_else(|| self.env.as_ref().and_then(|env| env.get("PATH")))
            .map(OsString::from)
            .or_else(|| env::var_os("PATH"))
    }

    fn build(&self) -> Result<Command, CommandError> {
        if let Some(dir) = &self.cwd {
            if !dir.is_dir() {
                return Err(CommandError::MissingCwd(dir.clone()));
            }
        }

        let mut command = match &self.program {
            Program::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
                let bare = Path::new(program).components().count() == 1;
                if bare && which_in(program, self.child_path()).is_none() {
                    return Err(CommandError::MissingExecutable(program.clone()));
                }
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            Program::Shell(line) => {
                if line.trim().is_empty() {
                    return Err(CommandError::Empty);
                }
                shell_command(line)
            }
        };

        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }
        command.envs(&self.partial_env);
        Ok(command)
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

/// Aggregated result of one [`CommandRunner::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// `None` when the child never started.
    pub exit_code: Option<i32>,
    pub worst_severity: Option<Severity>,
    pub num_errors: usize,
    pub spawned: bool,
    pub duration_ms: u64,
    pub succeeded: bool,
}

impl CommandOutcome {
    fn not_spawned() -> Self {
        Self {
            exit_code: None,
            worst_severity: None,
            num_errors: 0,
            spawned: false,
            duration_ms: 0,
            succeeded: false,
        }
    }

    /// Exit code to terminate with when this outcome is fatal: the child's
    /// own code, or [`EXIT_FAILURE`] when that is zero or missing.
    pub fn failure_code(&self) -> i32 {
        match self.exit_code {
            Some(code) if code != 0 => code,
            _ => EXIT_FAILURE,
        }
    }
}

/// Runs commands on behalf of an action, logging through `logger`.
#[derive(Debug, Clone, Copy)]
pub struct CommandRunner<'a> {
    logger: &'a Logger,
}

impl<'a> CommandRunner<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &'a Logger {
        self.logger
    }

    /// Run `spec` to completion, classifying every output line.
    ///
    /// Precondition failures (missing cwd or executable) are logged and
    /// returned as a not-spawned outcome. They only end the process when
    /// the command asks to halt.
    pub fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        let display = spec.program.to_string();
        match &spec.cwd {
            Some(dir) => self.logger.info(format!("Running command: {} in {}", display, dir.display())),
            None => self.logger.info(format!("Running command: {}", display)),
        }

        let mut command = match spec.build() {
            Ok(command) => command,
            Err(e) => return self.precondition_failed(spec, e),
        };
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return self.precondition_failed(
                    spec,
                    CommandError::SpawnFailed {
                        program: display,
                        message: e.to_string(),
                    },
                )
            }
        };

        let (mut lines, tx) = LineStream::new();
        if let Some(stdout) = child.stdout.take() {
            lines.attach(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            lines.attach(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut tally = OutputTally::new();
        while let Some(line) = lines.next_line() {
            let Some(verdict) = tally.observe(&spec.error_rules, &line.text) else {
                continue;
            };
            if let Some(level) = LogLevel::from_severity(verdict.severity) {
                self.logger.log(level, &line.text);
                if let Some(explanation) = verdict.explanation {
                    self.logger.log(level, explanation);
                }
            }
        }
        lines.join();

        let status = match child.wait() {
            Ok(status) => Some(status),
            Err(e) => {
                self.logger.error(format!("Failed to wait for {}: {}", display, e));
                None
            }
        };
        let exit_code = status.map(exit_code_of);

        let succeeded = exit_code.map_or(false, |code| spec.success_codes.contains(&code))
            && !tally.has_errors();
        let outcome = CommandOutcome {
            exit_code,
            worst_severity: tally.worst_severity,
            num_errors: tally.num_errors,
            spawned: true,
            duration_ms: start.elapsed().as_millis() as u64,
            succeeded,
        };

        let code_text = exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
        if succeeded {
            self.logger.info(format!("Return code: {}", code_text));
        } else {
            self.logger.error(format!("Return code: {}", code_text));
            if outcome.num_errors > 0 {
                self.logger
                    .error(format!("{} line(s) matched error rules", outcome.num_errors));
            }
            if spec.halt_on_failure {
                self.logger.fatal(
                    format!("Halting on failure while running {}", display),
                    outcome.failure_code(),
                );
            }
        }
        outcome
    }

    fn precondition_failed(&self, spec: &CommandSpec, error: CommandError) -> CommandOutcome {
        if spec.halt_on_failure {
            self.logger.fatal(error.to_string(), EXIT_FAILURE);
        } else {
            self.logger.error(error.to_string());
        }
        CommandOutcome::not_spawned()
    }
}

/// Exit code of a finished child. A child killed by signal N reports
/// `128 + N` on unix.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_FAILURE
}

/// Locate `program` the way a shell would.
///
/// Names containing a path separator are checked as given; bare names are
/// looked up in each `PATH` entry.
pub fn which(program: &str) -> Option<PathBuf> {
    which_in(program, env::var_os("PATH"))
}

/// [`which`] against an explicit `PATH` value.
pub fn which_in(program: &str, path: Option<OsString>) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    let path = path?;
    env::split_paths(&path)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(not(unix))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(program)];
    for ext in ["exe", "bat", "cmd"] {
        out.push(dir.join(format!("{}.{}", program, ext)));
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logger::{LogRecord, LogSink, MemorySink};
    use releng_rules::ErrorRule;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn capture() -> (Logger, MemorySink) {
        Logger::capture(LogLevel::Debug)
    }

    #[test]
    fn test_first_matching_rule_sets_level() {
        let (logger, sink) = capture();
        let rules = RuleSet::new(vec![
            ErrorRule::substr("WARN", Severity::Warning),
            ErrorRule::substr("WARNING: critical issue", Severity::Critical),
        ]);
        let spec = CommandSpec::shell("echo 'WARNING: critical issue'").error_rules(rules);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.succeeded);
        assert_eq!(outcome.worst_severity, Some(Severity::Warning));
        assert_eq!(sink.messages_at(LogLevel::Warning), vec!["WARNING: critical issue"]);
        assert!(sink.messages_at(LogLevel::Critical).is_empty());
    }

    #[test]
    fn test_zero_exit_with_error_line_fails() {
        let (logger, _sink) = capture();
        let rules = RuleSet::new(vec![ErrorRule::substr("error:", Severity::Error)]);
        let spec = CommandSpec::shell("echo 'build error: boom'; exit 0").error_rules(rules);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.num_errors, 1);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_extra_success_code() {
        let (logger, sink) = capture();
        let spec = CommandSpec::shell("echo fine; exit 1").success_codes(vec![0, 1]);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(sink.messages_at(LogLevel::Info).contains(&"Return code: 1".to_string()));
    }

    #[test]
    fn test_failure_without_halt_returns() {
        let (logger, sink) = capture();
        let spec = CommandSpec::shell("exit 3");

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.failure_code(), 3);
        assert!(sink.messages_at(LogLevel::Error).contains(&"Return code: 3".to_string()));
        assert!(sink.messages_at(LogLevel::Fatal).is_empty());
    }

    #[test]
    fn test_halt_with_non_halting_logger_logs_fatal() {
        let (logger, sink) = capture();
        let spec = CommandSpec::shell("exit 4").halt_on_failure(true);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert_eq!(outcome.failure_code(), 4);
        assert_eq!(sink.messages_at(LogLevel::Fatal).len(), 1);
    }

    #[test]
    fn test_ignore_suppresses_and_explanation_follows() {
        let (logger, sink) = capture();
        let rules = RuleSet::new(vec![
            ErrorRule::substr("noise", Severity::Ignore),
            ErrorRule::substr("disk full", Severity::Critical).with_explanation("free some space"),
        ]);
        let spec = CommandSpec::shell("echo noise; echo 'disk full'; echo").error_rules(rules);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(sink.records().iter().all(|r| r.message != "noise"));
        assert!(sink.contains("Running command: echo noise"));
        assert_eq!(
            sink.messages_at(LogLevel::Critical),
            vec!["disk full", "free some space"]
        );
        assert_eq!(outcome.num_errors, 1);
        assert!(!outcome.succeeded);
    }

    #[test]
    fn test_stderr_lines_are_classified() {
        let (logger, sink) = capture();
        let rules = RuleSet::new(vec![ErrorRule::substr("oops", Severity::Error)]);
        let spec = CommandSpec::shell("echo oops >&2").error_rules(rules);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert_eq!(outcome.num_errors, 1);
        assert!(sink.messages_at(LogLevel::Error).contains(&"oops".to_string()));
    }

    #[test]
    fn test_missing_cwd_is_not_spawned() {
        let (logger, sink) = capture();
        let spec = CommandSpec::shell("true").cwd("/definitely/not/here");

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(!outcome.spawned);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, None);
        assert!(sink.contains("non-existent directory"));
    }

    #[test]
    fn test_missing_executable_is_not_spawned() {
        let (logger, sink) = capture();
        let spec = CommandSpec::argv(["releng-no-such-tool-xyz", "--version"]);

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(!outcome.spawned);
        assert!(sink.contains("not found on PATH"));
    }

    fn install_tool(dir: &Path, name: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\necho tool-ran\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_executable_found_on_child_path() {
        let tools = TempDir::new().unwrap();
        install_tool(tools.path(), "releng-child-only-tool");
        let child_path = format!("{}:/usr/bin:/bin", tools.path().display());

        let (logger, sink) = capture();
        let spec = CommandSpec::argv(["releng-child-only-tool"]).partial_env("PATH", child_path.clone());
        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.spawned);
        assert!(outcome.succeeded);
        assert!(sink.messages_at(LogLevel::Info).contains(&"tool-ran".to_string()));

        let (logger, sink) = capture();
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), child_path);
        let spec = CommandSpec::argv(["releng-child-only-tool"]).env(env);
        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.succeeded);
        assert!(sink.contains("tool-ran"));
    }

    #[test]
    fn test_child_path_overrides_inherited_path() {
        let empty = TempDir::new().unwrap();
        let (logger, sink) = capture();
        let spec = CommandSpec::argv(["sh", "-c", "true"])
            .partial_env("PATH", empty.path().display().to_string());

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(!outcome.spawned);
        assert!(sink.contains("executable 'sh' not found on PATH"));
    }

    /// Sleeps on the first child line, then records whether the child had
    /// already written everything.
    struct SlowSink {
        marker: PathBuf,
        finished_early: Arc<Mutex<Option<bool>>>,
    }

    impl LogSink for SlowSink {
        fn accepts(&self, _level: LogLevel) -> bool {
            true
        }

        fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
            let mut seen = self.finished_early.lock().unwrap();
            if seen.is_none() && record.message == "releng-line" {
                thread::sleep(Duration::from_millis(500));
                *seen = Some(self.marker.exists());
            }
            Ok(())
        }
    }

    #[test]
    fn test_slow_logging_holds_back_child() {
        let dir = TempDir::new().unwrap();
        let finished_early = Arc::new(Mutex::new(None));
        let sink = SlowSink {
            marker: dir.path().join("done"),
            finished_early: Arc::clone(&finished_early),
        };
        let logger = Logger::with_sinks(vec![Box::new(sink)], false);

        // ~2.6 MB, far past a pipe buffer
        let spec = CommandSpec::shell("yes releng-line | head -n 200000; touch done").cwd(dir.path());
        let outcome = CommandRunner::new(&logger).run(&spec);

        assert!(outcome.succeeded);
        assert!(dir.path().join("done").exists());
        assert_eq!(*finished_early.lock().unwrap(), Some(false));
    }

    #[test]
    fn test_cwd_and_partial_env() {
        let dir = TempDir::new().unwrap();
        let (logger, sink) = capture();
        let spec = CommandSpec::shell("pwd; echo \"value=$RELENG_TEST_VAR\"")
            .cwd(dir.path())
            .partial_env("RELENG_TEST_VAR", "42");

        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.succeeded);
        assert!(sink.contains("value=42"));
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(sink.contains(name));
    }

    #[test]
    fn test_full_env_replaces_inherited() {
        std::env::set_var("RELENG_INHERITED_VAR", "leaked");
        let (logger, sink) = capture();
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        let spec = CommandSpec::shell("echo \"inherited=${RELENG_INHERITED_VAR:-none}\"").env(env);

        CommandRunner::new(&logger).run(&spec);
        assert!(sink.contains("inherited=none"));
    }

    #[test]
    fn test_argv_runs_without_shell() {
        let (logger, sink) = capture();
        let spec = CommandSpec::argv(["echo", "$HOME"]);
        let outcome = CommandRunner::new(&logger).run(&spec);
        assert!(outcome.succeeded);
        assert!(sink.messages_at(LogLevel::Info).contains(&"$HOME".to_string()));
    }

    #[test]
    fn test_signal_exit_code() {
        let (logger, _sink) = capture();
        let outcome = CommandRunner::new(&logger).run(&CommandSpec::shell("kill -9 $$"));
        assert_eq!(outcome.exit_code, Some(128 + 9));
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("releng-no-such-tool-xyz").is_none());
        assert_eq!(which("/bin/sh"), Some(PathBuf::from("/bin/sh")));
    }
}
