//! Shell command execution
//!
//! Every command task runs as one child process through the platform shell.
//! The caller is suspended until the child exits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use console::style;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, RunnerError};

/// Runs shell commands as child processes
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    /// Shell override; the platform default is looked up on PATH otherwise
    shell: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific shell binary instead of `sh` / `cmd`
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: Some(shell.into()),
        }
    }

    /// Run `command` with the process environment overlaid with `env`.
    ///
    /// With `verbose` the child inherits stdout/stderr; otherwise output is
    /// captured and stderr is attached to the error on failure.
    pub async fn execute(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        verbose: bool,
    ) -> Result<()> {
        let mut child = self.shell_command(command)?;
        child.envs(env).stdin(Stdio::null());

        if verbose {
            println!("{}", style(format!("Executing: {}", command)).dim());
            child.stdout(Stdio::inherit()).stderr(Stdio::inherit());

            let status = child.status().await.map_err(|e| spawn_error(command, e))?;
            debug!(command, ?status, "command exited");

            if !status.success() {
                return Err(RunnerError::CommandFailed {
                    command: command.to_string(),
                    code: status.code().unwrap_or(1),
                    stderr: None,
                });
            }
        } else {
            child.stdout(Stdio::piped()).stderr(Stdio::piped());

            let output = child.output().await.map_err(|e| spawn_error(command, e))?;
            debug!(command, status = ?output.status, "command exited");

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(RunnerError::CommandFailed {
                    command: command.to_string(),
                    code: output.status.code().unwrap_or(1),
                    stderr: (!stderr.is_empty()).then_some(stderr),
                });
            }
        }

        Ok(())
    }

    /// Build the shell invocation for a command string
    fn shell_command(&self, command: &str) -> Result<Command> {
        let (default_shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let shell = match &self.shell {
            Some(shell) => shell.clone(),
            None => which::which(default_shell).map_err(|e| RunnerError::SpawnError {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
            })?,
        };

        let mut c = Command::new(shell);
        c.arg(flag).arg(command);
        Ok(c)
    }
}

fn spawn_error(command: &str, source: std::io::Error) -> RunnerError {
    RunnerError::SpawnError {
        command: command.to_string(),
        source,
    }
}
