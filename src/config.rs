//! Configuration parsing for runnel.toml
//!
//! The file is deserialized into plain records first, then every task record
//! is resolved into a [`Task`] with exactly one [`TaskKind`]. Resolution is
//! where invalid definitions are rejected.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, RunnerError};
use crate::script::ScriptFunction;
use crate::task::{FileOps, Task, TaskKind};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["runnel.toml", "Runnel.toml"];

/// On-disk layout of runnel.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub options: GlobalOptions,

    /// Environment added to every command task
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Raw task tables, in declaration order
    #[serde(default)]
    pub tasks: toml::Table,

    #[serde(default)]
    pub watch: WatchSettings,
}

/// Global `[options]` table
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalOptions {
    /// Default verbosity, combined with the command-line flag
    #[serde(default)]
    pub verbose: bool,

    /// Advisory only; scheduling never reads it
    #[serde(default)]
    pub parallel: bool,
}

/// Global `[watch]` table
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WatchSettings {
    #[serde(default = "default_watch_patterns")]
    pub patterns: Vec<String>,

    #[serde(default = "default_watch_ignore")]
    pub ignore: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            patterns: default_watch_patterns(),
            ignore: default_watch_ignore(),
        }
    }
}

fn default_watch_patterns() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_watch_ignore() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        "target/**".to_string(),
        "node_modules/**".to_string(),
    ]
}

/// A task as written in the file. Which body field is set decides its kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRecord {
    #[serde(default, alias = "desc")]
    pub description: Option<String>,

    pub command: Option<String>,

    /// Extra environment for `command`
    #[serde(default)]
    pub env: HashMap<String, String>,

    pub sequence: Option<Vec<String>>,

    pub parallel: Option<Vec<String>>,

    pub function: Option<FunctionSource>,

    pub files: Option<FilesRecord>,
}

/// Rhai source for a function task, inline or in a separate file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FunctionSource {
    Inline(String),
    File { path: PathBuf },
}

/// `files = { delete = [...], copy = { src = "dest" } }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesRecord {
    #[serde(default)]
    pub delete: Vec<String>,

    /// Kept as a table so the declaration order survives
    #[serde(default)]
    pub copy: toml::Table,
}

/// Resolved configuration: global settings plus the task mapping
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub options: GlobalOptions,
    pub env: HashMap<String, String>,
    pub watch: WatchSettings,
    tasks: HashMap<String, Task>,
    /// Task names in declaration order
    order: Vec<String>,
}

impl Config {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    p.to_path_buf()
                } else {
                    return Err(RunnerError::ConfigNotFound {
                        searched: vec![p.to_path_buf()],
                    });
                }
            }
            None => Self::find_config()?,
        };

        let content = std::fs::read_to_string(&config_path)?;
        let config = Self::parse(&content, &config_path)?;

        Ok((config, config_path))
    }

    /// Parse configuration text. `path` is used for error messages and to
    /// resolve script files relative to the config.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| RunnerError::ConfigParse {
            source: e,
            path: path.to_path_buf(),
        })?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Self::from_file(file, base_dir)
    }

    /// Resolve every task record into a task with a single kind
    pub fn from_file(file: ConfigFile, base_dir: &Path) -> Result<Self> {
        let mut config = Self {
            options: file.options,
            env: file.env,
            watch: file.watch,
            ..Self::default()
        };

        for (name, value) in file.tasks {
            let record: TaskRecord = value
                .try_into()
                .map_err(|e: toml::de::Error| RunnerError::invalid_task(&name, e.message()))?;
            config.insert_task(resolve_task(&name, record, base_dir)?);
        }

        Ok(config)
    }

    /// Search for config file starting from current directory
    fn find_config() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        let mut searched = Vec::new();

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                searched.push(candidate.clone());
                if candidate.exists() {
                    return Ok(candidate);
                }
            }

            if !current.pop() {
                break;
            }
        }

        Err(RunnerError::ConfigNotFound { searched })
    }

    /// Get a task by name
    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Get a task by name, failing with `TaskNotFound`
    pub fn lookup(&self, name: &str) -> Result<&Task> {
        self.tasks.get(name).ok_or_else(|| RunnerError::TaskNotFound {
            name: name.to_string(),
            available: self.sorted_task_names().into_iter().map(String::from).collect(),
        })
    }

    /// Add or replace a task. Used to register native function tasks.
    pub fn insert_task(&mut self, task: Task) -> Option<Task> {
        let name = task.name.clone();
        let previous = self.tasks.insert(name.clone(), task);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Task names in declaration order
    pub fn task_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Task names in alphabetical order
    pub fn sorted_task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Environment for a command: global `[env]` overlaid with the task's own
    pub fn command_env(&self, task_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.extend(task_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

/// Pick the task kind. When several body fields are set, the first of
/// command, sequence, parallel, function, files wins.
fn resolve_task(name: &str, record: TaskRecord, base_dir: &Path) -> Result<Task> {
    let present: Vec<&str> = [
        ("command", record.command.is_some()),
        ("sequence", record.sequence.is_some()),
        ("parallel", record.parallel.is_some()),
        ("function", record.function.is_some()),
        ("files", record.files.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, set)| set.then_some(field))
    .collect();

    if present.len() > 1 {
        warn!(
            task = name,
            using = present[0],
            ignored = ?&present[1..],
            "task defines more than one body; using the first by priority"
        );
    }

    if record.command.is_none() && !record.env.is_empty() {
        warn!(task = name, "'env' only applies to command tasks and is ignored");
    }

    let kind = if let Some(command) = record.command {
        TaskKind::Command {
            command,
            env: record.env,
        }
    } else if let Some(members) = record.sequence {
        TaskKind::Sequence(members)
    } else if let Some(members) = record.parallel {
        TaskKind::Parallel(members)
    } else if let Some(source) = record.function {
        let script = match source {
            FunctionSource::Inline(code) => code,
            FunctionSource::File { path } => {
                let path = base_dir.join(path);
                std::fs::read_to_string(&path).map_err(|e| {
                    RunnerError::invalid_task(
                        name,
                        format!("cannot read script {}: {}", path.display(), e),
                    )
                })?
            }
        };
        TaskKind::Function(std::sync::Arc::new(ScriptFunction::compile(name, &script)?))
    } else if let Some(files) = record.files {
        TaskKind::Files(resolve_files(name, files)?)
    } else {
        return Err(RunnerError::invalid_task(
            name,
            "task must define one of 'command', 'sequence', 'parallel', 'function' or 'files'",
        ));
    };

    Ok(Task {
        name: name.to_string(),
        description: record.description,
        kind,
    })
}

fn resolve_files(name: &str, files: FilesRecord) -> Result<FileOps> {
    let copy = files
        .copy
        .into_iter()
        .map(|(src, dest)| match dest {
            toml::Value::String(dest) => Ok((src, dest)),
            other => Err(RunnerError::invalid_task(
                name,
                format!(
                    "copy destination for '{}' must be a string, found {}",
                    src,
                    other.type_str()
                ),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FileOps {
        delete: files.delete,
        copy,
    })
}
