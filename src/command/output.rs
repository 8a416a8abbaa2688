//! Output capture without line classification.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::Stdio;
use std::time::Instant;

use super::{exit_code_of, CommandError, CommandRunner, CommandSpec};
use crate::error::EXIT_FAILURE;

/// Result of [`CommandRunner::get_output`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Stdout lines joined with `\n`, trailing blank lines removed.
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child never started.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub succeeded: bool,
}

impl CapturedOutput {
    pub fn failure_code(&self) -> i32 {
        match self.exit_code {
            Some(code) if code != 0 => code,
            _ => EXIT_FAILURE,
        }
    }
}

impl<'a> CommandRunner<'a> {
    /// Run `spec` with stdout and stderr captured to temporary files.
    ///
    /// Stdout is logged at info and stderr at error once the child exits.
    /// The run fails when the exit code is nonzero or anything was written
    /// to stderr. `error_rules` and `success_codes` are not consulted.
    pub fn get_output(&self, spec: &CommandSpec) -> CapturedOutput {
        let display = spec.program.to_string();
        self.logger()
            .info(format!("Getting output from command: {}", display));

        match self.capture(spec) {
            Ok(output) => {
                for line in output.stdout.lines() {
                    self.logger().info(line);
                }
                for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
                    self.logger().error(line);
                }
                if !output.succeeded {
                    let code = output
                        .exit_code
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
                    self.logger().error(format!("Return code: {}", code));
                    if spec.halt_on_failure {
                        self.logger().fatal(
                            format!("Halting on failure while running {}", display),
                            output.failure_code(),
                        );
                    }
                }
                output
            }
            Err(e) => {
                if spec.halt_on_failure {
                    self.logger().fatal(e.to_string(), EXIT_FAILURE);
                } else {
                    self.logger().error(e.to_string());
                }
                CapturedOutput::default()
            }
        }
    }

    fn capture(&self, spec: &CommandSpec) -> Result<CapturedOutput, CommandError> {
        let mut command = spec.build()?;
        let mut stdout_file = tempfile::tempfile().map_err(io_error)?;
        let mut stderr_file = tempfile::tempfile().map_err(io_error)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone().map_err(io_error)?))
            .stderr(Stdio::from(stderr_file.try_clone().map_err(io_error)?));

        let start = Instant::now();
        let status = command
            .status()
            .map_err(|e| CommandError::SpawnFailed {
                program: spec.program.to_string(),
                message: e.to_string(),
            })?;
        let exit_code = exit_code_of(status);

        let stdout = trim_trailing_blank_lines(&read_lossy(&mut stdout_file)?);
        let stderr = read_lossy(&mut stderr_file)?;
        let succeeded = exit_code == 0 && stderr.is_empty();

        Ok(CapturedOutput {
            stdout,
            stderr,
            exit_code: Some(exit_code),
            duration_ms: start.elapsed().as_millis() as u64,
            succeeded,
        })
    }
}

fn read_lossy(file: &mut File) -> Result<String, CommandError> {
    file.seek(SeekFrom::Start(0)).map_err(io_error)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(io_error)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn trim_trailing_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().map_or(false, |l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn io_error(e: std::io::Error) -> CommandError {
    CommandError::Io(e.to_string())
}
