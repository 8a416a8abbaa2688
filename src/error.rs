//! Top-level error type and process exit codes.

use std::io;

use thiserror::Error;

use crate::actions::ActionError;
use crate::config::ConfigError;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Generic failure exit code. Replaces the negative sentinel some platforms
/// refuse as a process exit status.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for command-line usage errors.
pub const EXIT_USAGE: i32 = 2;

/// Errors that end a harness invocation before or between actions.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Action(#[from] ActionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("usage error: {0}")]
    Usage(String),
}

impl HarnessError {
    /// Exit code to terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Usage(_) => EXIT_USAGE,
            HarnessError::Config(_)
            | HarnessError::Action(_)
            | HarnessError::Io(_)
            | HarnessError::Serialization(_) => EXIT_FAILURE,
        }
    }
}

/// Result type for harness setup.
pub type HarnessResult<T> = Result<T, HarnessError>;
