//! Builder for invoking external build tools.
//!
//! The bundler, the script-to-data converter, the pin generator, the native compiler and
//! the package manager are all opaque programs. [`ToolCommand`] gives them one fluent
//! interface with uniform logging and error reporting:
//!
//! ```rust,no_run
//! use fwbundle_cli::process::ToolCommand;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let output = ToolCommand::new("make")
//!     .args(["BOARD=K64F", "EXTRAS=/work/pkg/src"])
//!     .current_dir("/work/build")
//!     .with_context("compile")
//!     .execute()
//!     .await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! A failing or unstartable program becomes [`FwError::ExternalProcessError`] carrying the
//! context name, so the scheduler can report which build step failed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::FwError;

/// Type-safe builder for constructing and executing external tool commands.
///
/// Commands capture their output, inherit the parent environment and have no timeout:
/// external tools such as the native compiler can legitimately run for a long time.
pub struct ToolCommand {
    /// Program to run (name looked up on PATH, or a path)
    program: String,

    /// Arguments, in order
    args: Vec<String>,

    /// Working directory for the process
    current_dir: Option<PathBuf>,

    /// Maximum duration to wait for completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Name of the build step, used in logs and errors
    context: Option<String>,

    /// File receiving stdout followed by stderr once the process exits
    log_file: Option<PathBuf>,
}

/// Output of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Whether the process exited successfully
    pub success: bool,
    /// Human-readable exit status
    pub status: String,
}

impl ToolCommand {
    /// Creates a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout_duration: None,
            context: None,
            log_file: None,
        }
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a timeout for the command (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Names the build step running this command, for logs and errors.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Writes captured stdout and stderr to `path` after the process exits.
    pub fn log_to(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// The program this command runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments this command passes.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The full command line, for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn tool_name(&self) -> String {
        self.context.clone().unwrap_or_else(|| self.program.clone())
    }

    /// Runs the command and fails with [`FwError::ExternalProcessError`] on a non-zero exit.
    pub async fn execute(self) -> Result<ToolOutput> {
        let tool = self.tool_name();
        let output = self.execute_unchecked().await?;

        if !output.success {
            tracing::debug!(target: "process", "({}) failed with {}", tool, output.status);
            return Err(FwError::ExternalProcessError {
                tool,
                status: output.status,
                stderr: if output.stderr.trim().is_empty() {
                    output.stdout
                } else {
                    output.stderr
                },
            }
            .into());
        }

        Ok(output)
    }

    /// Runs the command and checks for success, discarding output.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }

    /// Runs the command and returns its output whatever the exit status.
    ///
    /// Failing to start the program (or hitting the timeout) is still an error.
    pub async fn execute_unchecked(self) -> Result<ToolOutput> {
        let start = std::time::Instant::now();
        let tool = self.tool_name();
        let command_line = self.command_line();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        tracing::debug!(target: "process", "({}) Executing: {}", tool, command_line);

        let output_future = cmd.output();
        let result = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "process",
                        "({}) timed out after {} seconds: {}",
                        tool,
                        duration.as_secs(),
                        command_line
                    );
                    return Err(FwError::ExternalProcessError {
                        tool,
                        status: format!("timed out after {} seconds", duration.as_secs()),
                        stderr: String::new(),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let reason = if err.kind() == std::io::ErrorKind::NotFound
                    && which::which(&self.program).is_err()
                {
                    format!("could not start `{}`: program not found", self.program)
                } else {
                    format!("could not start `{}`: {err}", self.program)
                };
                return Err(FwError::ExternalProcessError {
                    tool,
                    status: reason,
                    stderr: String::new(),
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stdout.is_empty() {
            tracing::debug!(target: "process", "({}) {}", tool, stdout.trim());
        }
        if !stderr.is_empty() {
            tracing::debug!(target: "process", "({}) {}", tool, stderr.trim());
        }

        if let Some(ref log_file) = self.log_file {
            let mut log = stdout.clone();
            log.push_str(&stderr);
            crate::utils::atomic_write(log_file, log.as_bytes())
                .with_context(|| format!("Failed to write log {}", log_file.display()))?;
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "process::perf", "({}) {} took {:.2}s", tool, self.program, elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "process::perf", "({}) {} took {}ms", tool, self.program, elapsed.as_millis());
        }

        let status = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };

        Ok(ToolOutput {
            stdout,
            stderr,
            success: output.status.success(),
            status,
        })
    }
}
