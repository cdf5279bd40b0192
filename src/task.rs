//! Resolved task definitions
//!
//! A [`Task`] carries exactly one [`TaskKind`]. The kind is chosen once, when
//! the configuration is loaded, so the dispatcher never has to guess.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Error type returned by custom function tasks
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

/// Per-invocation options, passed unchanged through every nested task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stream command output and log each step
    pub verbose: bool,
    /// Config path override given on the command line
    pub config: Option<PathBuf>,
}

impl RunOptions {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Caller-supplied logic run as a task.
///
/// The dispatcher only sees success or failure; nothing else about the
/// function is inspected.
pub trait TaskFunction: Send + Sync {
    fn call(&self, options: RunOptions) -> BoxFuture<'static, Result<(), FunctionError>>;
}

impl<F, Fut> TaskFunction for F
where
    F: Fn(RunOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
{
    fn call(&self, options: RunOptions) -> BoxFuture<'static, Result<(), FunctionError>> {
        (self)(options).boxed()
    }
}

/// Declarative file operations. Deletes always run before copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOps {
    /// Glob patterns to remove
    pub delete: Vec<String>,
    /// Source pattern -> destination path, in declaration order
    pub copy: Vec<(String, String)>,
}

impl FileOps {
    /// Every path or pattern these operations write to or remove
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.delete
            .iter()
            .map(String::as_str)
            .chain(self.copy.iter().map(|(_, dest)| dest.as_str()))
    }
}

/// The execution strategy of a task
#[derive(Clone)]
pub enum TaskKind {
    Command {
        command: String,
        env: HashMap<String, String>,
    },
    Sequence(Vec<String>),
    Parallel(Vec<String>),
    Function(Arc<dyn TaskFunction>),
    Files(FileOps),
}

impl TaskKind {
    /// Short label used in listings and logs
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Command { .. } => "command",
            TaskKind::Sequence(_) => "sequence",
            TaskKind::Parallel(_) => "parallel",
            TaskKind::Function(_) => "function",
            TaskKind::Files(_) => "files",
        }
    }

    /// Names of the tasks this one composes
    pub fn members(&self) -> &[String] {
        match self {
            TaskKind::Sequence(names) | TaskKind::Parallel(names) => names,
            _ => &[],
        }
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Command { command, env } => f
                .debug_struct("Command")
                .field("command", command)
                .field("env", env)
                .finish(),
            TaskKind::Sequence(names) => f.debug_tuple("Sequence").field(names).finish(),
            TaskKind::Parallel(names) => f.debug_tuple("Parallel").field(names).finish(),
            TaskKind::Function(_) => f.write_str("Function(..)"),
            TaskKind::Files(ops) => f.debug_tuple("Files").field(ops).finish(),
        }
    }
}

/// A named task
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub description: Option<String>,
    pub kind: TaskKind,
}

impl Task {
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
        }
    }

    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            TaskKind::Command {
                command: command.into(),
                env: HashMap::new(),
            },
        )
    }

    pub fn sequence<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            TaskKind::Sequence(members.into_iter().map(Into::into).collect()),
        )
    }

    pub fn parallel<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            TaskKind::Parallel(members.into_iter().map(Into::into).collect()),
        )
    }

    pub fn function(name: impl Into<String>, function: impl TaskFunction + 'static) -> Self {
        Self::new(name, TaskKind::Function(Arc::new(function)))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
