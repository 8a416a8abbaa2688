//! Levelled, multi-destination logging
//!
//! A [`Logger`] fans each record out to a set of [`LogSink`]s:
//! - console (stdout), optional
//! - one aggregate file, `<log_dir>/<log_name>.log`
//! - in multi mode, one file per level, `<log_dir>/<log_name>_<level>.log`
//!
//! The file named for level L receives every record at L or above, so an
//! `error` record lands in the info, warning and error files but not in the
//! critical or fatal ones.
//!
//! `fatal` records end the process unless the logger was built with
//! halting disabled.

mod sink;

pub use sink::{ConsoleSink, FileSink, LogSink, MemorySink};

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use releng_rules::Severity;
use serde::{Deserialize, Serialize};

use crate::error::EXIT_FAILURE;

/// Log levels, lowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Fatal => "fatal",
        }
    }

    /// Uppercase label used in formatted records.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Level to emit an output line classified at `severity`.
    /// `None` for `Severity::Ignore`.
    pub fn from_severity(severity: Severity) -> Option<Self> {
        match severity {
            Severity::Ignore => None,
            Severity::Debug => Some(LogLevel::Debug),
            Severity::Info => Some(LogLevel::Info),
            Severity::Warning => Some(LogLevel::Warning),
            Severity::Error => Some(LogLevel::Error),
            Severity::Critical => Some(LogLevel::Critical),
            Severity::Fatal => Some(LogLevel::Fatal),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

/// A single log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    /// `HH:MM:SS    LEVEL - message`
    pub fn format(&self) -> String {
        format!(
            "{} {:>8} - {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.label(),
            self.message
        )
    }
}

/// Logger topology and behavior.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Threshold for the console and the aggregate file.
    pub level: LogLevel,
    /// Write to stdout.
    pub console: bool,
    /// Directory for log files. No files are written when `None`.
    pub log_dir: Option<PathBuf>,
    /// Base file name without extension.
    pub log_name: String,
    /// Also write one file per level.
    pub multi_log: bool,
    /// Append to existing files instead of truncating.
    pub append: bool,
    /// Terminate the process on `fatal`.
    pub halt_on_fatal: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            log_dir: None,
            log_name: "log".to_string(),
            multi_log: false,
            append: false,
            halt_on_fatal: true,
        }
    }
}

impl LoggerConfig {
    /// Path of the aggregate log file.
    pub fn aggregate_path(&self) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", self.log_name)))
    }

    /// Path of the per-level file for `level` (multi mode).
    pub fn level_path(&self, level: LogLevel) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.log", self.log_name, level.as_str())))
    }
}

/// The harness logger.
pub struct Logger {
    sinks: Mutex<Vec<Box<dyn LogSink>>>,
    halt_on_fatal: bool,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.sinks.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("Logger")
            .field("sinks", &sinks)
            .field("halt_on_fatal", &self.halt_on_fatal)
            .finish()
    }
}

impl Logger {
    /// Build a logger from its configuration, creating the log directory and
    /// opening every file up front.
    pub fn new(config: &LoggerConfig) -> io::Result<Self> {
        let mut sinks: Vec<Box<dyn LogSink>> = Vec::new();

        if config.console {
            sinks.push(Box::new(ConsoleSink::new(config.level)));
        }

        if let Some(dir) = &config.log_dir {
            fs::create_dir_all(dir)?;
            if let Some(path) = config.aggregate_path() {
                sinks.push(Box::new(FileSink::open(&path, config.level, config.append)?));
            }
            if config.multi_log {
                for level in LogLevel::ALL.iter().filter(|l| **l >= config.level) {
                    if let Some(path) = config.level_path(*level) {
                        sinks.push(Box::new(FileSink::open(&path, *level, config.append)?));
                    }
                }
            }
        }

        Ok(Self::with_sinks(sinks, config.halt_on_fatal))
    }

    pub fn with_sinks(sinks: Vec<Box<dyn LogSink>>, halt_on_fatal: bool) -> Self {
        Self {
            sinks: Mutex::new(sinks),
            halt_on_fatal,
        }
    }

    /// A non-halting logger that records everything in memory.
    pub fn capture(threshold: LogLevel) -> (Self, MemorySink) {
        let sink = MemorySink::new(threshold);
        let logger = Self::with_sinks(vec![Box::new(sink.clone())], false);
        (logger, sink)
    }

    /// A non-halting logger with no destinations.
    pub fn discard() -> Self {
        Self::with_sinks(Vec::new(), false)
    }

    pub fn halts_on_fatal(&self) -> bool {
        self.halt_on_fatal
    }

    /// Emit `message` at `level`. A `Fatal` level takes the fatal path.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if level == LogLevel::Fatal {
            self.fatal(message, EXIT_FAILURE);
        } else {
            self.emit(&LogRecord::new(level, message.as_ref()));
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Critical, message);
    }

    /// Log at `fatal`, then exit with `exit_code` unless halting is disabled.
    ///
    /// Exit codes outside `1..=255` are replaced with [`EXIT_FAILURE`].
    pub fn fatal(&self, message: impl AsRef<str>, exit_code: i32) {
        self.emit(&LogRecord::new(LogLevel::Fatal, message.as_ref()));
        if self.halt_on_fatal {
            let code = normalize_exit_code(exit_code);
            self.emit(&LogRecord::new(
                LogLevel::Fatal,
                format!("Exiting {}", code),
            ));
            self.flush();
            std::process::exit(code);
        }
    }

    pub fn flush(&self) {
        if let Ok(mut sinks) = self.sinks.lock() {
            for sink in sinks.iter_mut() {
                let _ = sink.flush();
            }
        }
    }

    fn emit(&self, record: &LogRecord) {
        if let Ok(mut sinks) = self.sinks.lock() {
            for sink in sinks.iter_mut().filter(|s| s.accepts(record.level)) {
                let _ = sink.write_record(record);
            }
        }
    }
}

/// Map an exit code onto one every platform accepts.
pub fn normalize_exit_code(code: i32) -> i32 {
    if (1..=255).contains(&code) {
        code
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: Option<PathBuf>) -> String {
        fs::read_to_string(path.unwrap()).unwrap_or_default()
    }

    #[test]
    fn test_level_order_and_parse() {
        assert!(LogLevel::Critical < LogLevel::Fatal);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("ignore".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_from_severity() {
        assert_eq!(LogLevel::from_severity(Severity::Ignore), None);
        assert_eq!(LogLevel::from_severity(Severity::Error), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_severity(Severity::Fatal), Some(LogLevel::Fatal));
    }

    #[test]
    fn test_record_format() {
        let record = LogRecord::new(LogLevel::Info, "hello");
        let line = record.format();
        assert!(line.ends_with("    INFO - hello"), "got {}", line);
        assert_eq!(line.len(), "00:00:00".len() + " ".len() + 8 + " - hello".len());
    }

    #[test]
    fn test_capture_filters_by_threshold() {
        let (logger, sink) = Logger::capture(LogLevel::Info);
        logger.debug("hidden");
        logger.info("shown");
        logger.error("bad");
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.messages_at(LogLevel::Error), vec!["bad".to_string()]);
    }

    #[test]
    fn test_fatal_without_halt_only_logs() {
        let (logger, sink) = Logger::capture(LogLevel::Debug);
        logger.fatal("going down", 3);
        logger.info("still here");
        assert_eq!(sink.messages_at(LogLevel::Fatal), vec!["going down".to_string()]);
        assert!(sink.contains("still here"));
    }

    #[test]
    fn test_log_at_fatal_takes_fatal_path() {
        let (logger, sink) = Logger::capture(LogLevel::Debug);
        logger.log(LogLevel::Fatal, "line classified fatal");
        assert_eq!(sink.messages_at(LogLevel::Fatal).len(), 1);
    }

    #[test]
    fn test_normalize_exit_code() {
        assert_eq!(normalize_exit_code(-1), 1);
        assert_eq!(normalize_exit_code(0), 1);
        assert_eq!(normalize_exit_code(2), 2);
        assert_eq!(normalize_exit_code(256), 1);
    }

    #[test]
    fn test_simple_log_writes_aggregate_only() {
        let dir = TempDir::new().unwrap();
        let config = LoggerConfig {
            console: false,
            log_dir: Some(dir.path().to_path_buf()),
            halt_on_fatal: false,
            ..LoggerConfig::default()
        };
        let logger = Logger::new(&config).unwrap();
        logger.debug("below threshold");
        logger.warning("careful");
        logger.flush();

        let aggregate = read(config.aggregate_path());
        assert!(aggregate.contains("careful"));
        assert!(!aggregate.contains("below threshold"));
        assert!(!config.level_path(LogLevel::Warning).unwrap().exists());
    }

    #[test]
    fn test_multi_log_threshold_per_file() {
        let dir = TempDir::new().unwrap();
        let config = LoggerConfig {
            console: false,
            log_dir: Some(dir.path().to_path_buf()),
            multi_log: true,
            halt_on_fatal: false,
            ..LoggerConfig::default()
        };
        let logger = Logger::new(&config).unwrap();
        logger.error("an error");
        logger.flush();

        // info threshold: no debug file at all
        assert!(!config.level_path(LogLevel::Debug).unwrap().exists());

        for level in [LogLevel::Info, LogLevel::Warning, LogLevel::Error] {
            assert!(
                read(config.level_path(level)).contains("an error"),
                "missing from {} file",
                level
            );
        }
        for level in [LogLevel::Critical, LogLevel::Fatal] {
            assert!(
                !read(config.level_path(level)).contains("an error"),
                "leaked into {} file",
                level
            );
        }
        assert!(read(config.aggregate_path()).contains("an error"));
    }

    #[test]
    fn test_multi_log_critical_reaches_lower_files() {
        let dir = TempDir::new().unwrap();
        let config = LoggerConfig {
            level: LogLevel::Debug,
            console: false,
            log_dir: Some(dir.path().to_path_buf()),
            multi_log: true,
            halt_on_fatal: false,
            ..LoggerConfig::default()
        };
        let logger = Logger::new(&config).unwrap();
        logger.critical("meltdown");
        logger.flush();

        assert!(read(config.level_path(LogLevel::Debug)).contains("meltdown"));
        assert!(read(config.level_path(LogLevel::Critical)).contains("meltdown"));
        assert!(!read(config.level_path(LogLevel::Fatal)).contains("meltdown"));
    }
}
