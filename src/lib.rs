//! runnel - a declarative task runner
//!
//! This crate provides both a CLI tool and a library for running named tasks
//! defined in `runnel.toml`.
//!
//! # Features
//!
//! - **Command tasks** - run a shell command with extra environment
//! - **Sequences** - run tasks one after another, stopping at the first failure
//! - **Parallel groups** - run tasks concurrently, all must succeed
//! - **Function tasks** - Rhai scripts, or native closures registered in code
//! - **File operations** - glob-based delete and copy
//! - **Watch mode** - re-run a task whenever watched files change
//!
//! # Example
//!
//! ```toml
//! # runnel.toml
//!
//! [tasks.build]
//! description = "Build the project"
//! command = "cargo build --release"
//!
//! [tasks.clean]
//! files = { delete = ["dist/**"] }
//!
//! [tasks.release]
//! sequence = ["clean", "build"]
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use runnel::{ConfigStore, Dispatcher, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(ConfigStore::load(None)?);
//!     let dispatcher = Dispatcher::new(store);
//!
//!     dispatcher.run("release", &RunOptions::default()).await?;
//!     dispatcher.drain().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod files;
pub mod graph;
pub mod script;
pub mod store;
pub mod task;
pub mod watch;

// Re-export main types
pub use config::{Config, GlobalOptions, WatchSettings};
pub use dispatch::Dispatcher;
pub use error::{Result, RunnerError};
pub use executor::CommandExecutor;
pub use files::FileOperator;
pub use graph::TaskGraph;
pub use script::ScriptFunction;
pub use store::ConfigStore;
pub use task::{FileOps, FunctionError, RunOptions, Task, TaskFunction, TaskKind};
pub use watch::{ChangeEvent, ChangeKind, WatchController, WatchPatterns, WatchReport};
