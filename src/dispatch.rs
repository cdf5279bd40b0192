//! Task dispatch
//!
//! Looks a task up by name and runs it according to its kind. Sequences and
//! parallel groups recurse back into the dispatcher for their members.
//!
//! Every top-level run works on one configuration snapshot, taken when the
//! run starts, and carries the chain of task names currently being executed
//! so that a task reaching itself again fails with `CycleDetected` instead of
//! recursing forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::style;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, RunnerError};
use crate::executor::CommandExecutor;
use crate::files::FileOperator;
use crate::store::ConfigStore;
use crate::task::{RunOptions, TaskKind};

/// Routes task names to their execution strategy
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<ConfigStore>,
    executor: CommandExecutor,
    files: FileOperator,
    progress: MultiProgress,
    /// Parallel members still running after a sibling failed
    detached: Arc<Mutex<Vec<JoinHandle<Result<()>>>>>,
}

impl Dispatcher {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            executor: CommandExecutor::new(),
            files: FileOperator::new(),
            progress: MultiProgress::new(),
            detached: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Dispatcher over a fixed configuration
    pub fn from_config(config: Config) -> Self {
        Self::new(Arc::new(ConfigStore::from_config(config)))
    }

    pub fn with_executor(mut self, executor: CommandExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_file_operator(mut self, files: FileOperator) -> Self {
        self.files = files;
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Run a task by name
    pub async fn run(&self, name: &str, options: &RunOptions) -> Result<()> {
        let config = self.store.snapshot();
        self.clone()
            .run_task(config, name.to_string(), options.clone(), Vec::new())
            .await
    }

    /// Wait for parallel members that were left running when a sibling
    /// failed. Their own failures are logged, not returned.
    pub async fn drain(&self) {
        loop {
            let handles = std::mem::take(&mut *self.detached.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                break;
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("parallel task failed after its group was reported: {}", e),
                    Err(e) => warn!("parallel task did not complete: {}", e),
                }
            }
        }
    }

    fn run_task(
        self,
        config: Arc<Config>,
        name: String,
        options: RunOptions,
        mut stack: Vec<String>,
    ) -> BoxFuture<'static, Result<()>> {
        async move {
            let task = config.lookup(&name)?;

            if stack.contains(&name) {
                stack.push(name);
                return Err(RunnerError::CycleDetected {
                    cycle: stack.join(" -> "),
                });
            }
            stack.push(name.clone());

            let verbose = options.verbose || config.options.verbose;
            if verbose {
                println!("{}", style(format!("Running task: {}", name)).blue());
            }
            debug!(task = %name, kind = task.kind.label(), depth = stack.len(), "dispatching");

            match &task.kind {
                TaskKind::Command { command, env } => {
                    let env = config.command_env(env);
                    self.run_command(&name, command, &env, verbose).await
                }

                TaskKind::Sequence(members) => {
                    for member in members {
                        self.clone()
                            .run_task(
                                Arc::clone(&config),
                                member.clone(),
                                options.clone(),
                                stack.clone(),
                            )
                            .await?;
                    }
                    Ok(())
                }

                TaskKind::Parallel(members) => {
                    self.run_parallel(&config, members, &options, &stack).await
                }

                TaskKind::Function(function) => {
                    function
                        .call(options.clone())
                        .await
                        .map_err(|e| RunnerError::CustomFunction {
                            task: name.clone(),
                            message: e.to_string(),
                        })
                }

                TaskKind::Files(ops) => {
                    let ops = ops.clone();
                    let files = self.files.clone();
                    tokio::task::spawn_blocking(move || files.apply(&ops, verbose))
                        .await
                        .map_err(join_error)?
                }
            }
        }
        .boxed()
    }

    async fn run_command(
        &self,
        task: &str,
        command: &str,
        env: &HashMap<String, String>,
        verbose: bool,
    ) -> Result<()> {
        if verbose {
            return self.executor.execute(command, env, true).await;
        }

        let pb = self.progress.add(ProgressBar::new_spinner());
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(spinner);
        }
        pb.set_message(format!("Running {}", task));
        pb.enable_steady_tick(Duration::from_millis(100));

        let result = self.executor.execute(command, env, false).await;

        pb.finish_and_clear();
        result
    }

    /// Start every member before awaiting any. The first failure is returned
    /// as soon as it is seen; the remaining members keep running.
    async fn run_parallel(
        &self,
        config: &Arc<Config>,
        members: &[String],
        options: &RunOptions,
        stack: &[String],
    ) -> Result<()> {
        let mut pending: FuturesUnordered<JoinHandle<Result<()>>> = members
            .iter()
            .map(|member| {
                tokio::spawn(self.clone().run_task(
                    Arc::clone(config),
                    member.clone(),
                    options.clone(),
                    stack.to_vec(),
                ))
            })
            .collect();

        while let Some(joined) = pending.next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => join_error(e),
            };

            let remaining: Vec<_> = pending.into_iter().collect();
            debug!(still_running = remaining.len(), "parallel group failed");
            {
                let mut detached = self.detached.lock().unwrap_or_else(|e| e.into_inner());
                // Long-lived dispatchers (watch mode) never drain
                detached.retain(|h| !h.is_finished());
                detached.extend(remaining);
            }
            return Err(failure);
        }

        Ok(())
    }
}

fn join_error(e: JoinError) -> RunnerError {
    RunnerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
