//! Run summary (run_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::EXIT_SUCCESS;
use crate::logger::{LogLevel, Logger};

/// Schema version for run_summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "releng-lane/run_summary@1";

/// Per-action status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Handler and hooks completed
    Success,
    /// Preflight, handler or postflight failed
    Failed,
    /// Not run because an earlier action failed
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        }
    }
}

/// Outcome of one resolved action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub duration_ms: u64,
}

/// Free-form line a handler asked to include in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Success or failure of one sub-item (a locale, a device, a platform).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub action: String,
    pub item: String,
    pub ok: bool,
}

/// Run summary (run_summary.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Results in execution order
    pub actions: Vec<ActionResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<SummaryEntry>,

    /// Wall-clock duration of the entire run in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id: run_id.into(),
            started_at: Utc::now(),
            actions: Vec::new(),
            items: Vec::new(),
            entries: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.actions.iter().filter(|a| a.status == status).count()
    }

    pub fn succeeded(&self) -> bool {
        self.count(Status::Failed) == 0
    }

    /// Exit code of the first failed action, else success.
    pub fn exit_code(&self) -> i32 {
        self.actions
            .iter()
            .find(|a| a.status == Status::Failed)
            .map(|a| a.exit_code.unwrap_or(crate::error::EXIT_FAILURE))
            .unwrap_or(EXIT_SUCCESS)
    }

    pub fn human_summary(&self) -> String {
        let total = self.actions.len();
        let ok = self.count(Status::Success);
        if total == 0 {
            "No actions executed".to_string()
        } else if self.succeeded() {
            format!("Run succeeded: {}/{} actions passed", ok, total)
        } else {
            format!(
                "Run failed: {} succeeded, {} failed, {} skipped",
                ok,
                self.count(Status::Failed),
                self.count(Status::Skipped)
            )
        }
    }

    /// Emit the summary block through `logger`.
    pub fn log(&self, logger: &Logger) {
        logger.info("##### Summary");
        for result in &self.actions {
            let line = match &result.message {
                Some(message) => format!("{}: {} ({})", result.action, result.status.as_str(), message),
                None => format!("{}: {}", result.action, result.status.as_str()),
            };
            let level = match result.status {
                Status::Failed => LogLevel::Error,
                Status::Skipped => LogLevel::Warning,
                Status::Success => LogLevel::Info,
            };
            logger.log(level, line);
        }
        for item in &self.items {
            let (level, word) = if item.ok {
                (LogLevel::Info, "success")
            } else {
                (LogLevel::Error, "failure")
            };
            logger.log(level, format!("{} {}: {}", item.action, item.item, word));
        }
        for entry in &self.entries {
            // A fatal summary entry must not end the process here.
            let level = entry.level.min(LogLevel::Critical);
            logger.log(level, &entry.message);
        }
        let level = if self.succeeded() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        logger.log(level, self.human_summary());
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
    }
}
