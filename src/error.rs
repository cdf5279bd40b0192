//! Error types for runnel
//!
//! Uses `miette` for pretty error reporting with codes and help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for runnel operations
#[derive(Error, Diagnostic, Debug)]
pub enum RunnerError {
    #[error("Configuration file not found")]
    #[diagnostic(
        code(runnel::config::not_found),
        help("Create a runnel.toml with `runnel init`, or specify one with --config")
    )]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("Failed to parse configuration {}", path.display())]
    #[diagnostic(code(runnel::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Task '{name}' not found")]
    #[diagnostic(
        code(runnel::task::not_found),
        help("Run `runnel list` to see available tasks")
    )]
    TaskNotFound { name: String, available: Vec<String> },

    #[error("Invalid configuration for task '{task}': {reason}")]
    #[diagnostic(code(runnel::config::invalid_task))]
    InvalidTaskConfig { task: String, reason: String },

    #[error("Task cycle detected: {cycle}")]
    #[diagnostic(
        code(runnel::task::cycle),
        help("Check the 'sequence' and 'parallel' lists in your task definitions")
    )]
    CycleDetected { cycle: String },

    #[error("Command `{command}` failed with exit code {code}")]
    #[diagnostic(code(runnel::exec::failed))]
    CommandFailed {
        command: String,
        code: i32,
        #[help]
        stderr: Option<String>,
    },

    #[error("Failed to spawn `{command}`")]
    #[diagnostic(
        code(runnel::exec::spawn),
        help("Ensure a shell is installed and in your PATH")
    )]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File operation '{op}' failed on {}: {reason}", path.display())]
    #[diagnostic(code(runnel::files))]
    FileOp {
        op: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("Function task '{task}' failed: {message}")]
    #[diagnostic(code(runnel::function::failed))]
    CustomFunction { task: String, message: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    #[diagnostic(code(runnel::pattern))]
    InvalidPattern { pattern: String, reason: String },

    #[error("I/O error")]
    #[diagnostic(code(runnel::io))]
    Io(#[from] std::io::Error),

    #[error("Watch error")]
    #[diagnostic(code(runnel::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },
}

impl RunnerError {
    pub(crate) fn invalid_task(task: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTaskConfig {
            task: task.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for runnel operations
pub type Result<T> = std::result::Result<T, RunnerError>;
