//! File watching for automatic task re-execution
//!
//! A `notify` watcher feeds change events into the controller loop. Every
//! event that touches a watched, non-ignored path starts one run of the bound
//! task. Runs are not debounced and may overlap.

use std::future::Future;
use std::path::{Path, PathBuf};

use console::style;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{Result, RunnerError};
use crate::task::RunOptions;

/// Compiled watch and ignore patterns. `*` stays within one path segment;
/// only `**` crosses directories.
#[derive(Debug, Clone)]
pub struct WatchPatterns {
    patterns: Vec<String>,
    ignore: Vec<String>,
    watch_set: GlobSet,
    ignore_set: GlobSet,
}

impl WatchPatterns {
    pub fn new(patterns: &[String], ignore: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: patterns.to_vec(),
            ignore: ignore.to_vec(),
            watch_set: build_globset(patterns)?,
            ignore_set: build_globset(ignore)?,
        })
    }

    /// True if a path relative to the watch root should trigger a run
    pub fn matches(&self, rel_path: &str) -> bool {
        self.watch_set.is_match(rel_path) && !self.ignore_set.is_match(rel_path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| RunnerError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RunnerError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

/// What happened to the paths of a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Other,
}

/// A filesystem change as seen by the controller
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }
}

impl From<Event> for ChangeEvent {
    fn from(event: Event) -> Self {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => ChangeKind::Other,
        };
        Self {
            kind,
            paths: event.paths,
        }
    }
}

/// Keeps the OS watcher alive; dropping it ends the subscription
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Outcome of a finished watch session
#[derive(Debug)]
pub struct WatchReport {
    /// Number of runs started
    pub triggered: usize,
    /// Runs still executing when the watch stopped
    pub in_flight: Vec<JoinHandle<()>>,
}

/// Re-runs one task whenever a watched file changes
pub struct WatchController {
    dispatcher: Dispatcher,
    task: String,
    options: RunOptions,
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    patterns: WatchPatterns,
}

impl WatchController {
    /// Bind `task` to changes under `root`. The task must exist.
    pub fn new(
        dispatcher: Dispatcher,
        task: &str,
        options: RunOptions,
        root: impl Into<PathBuf>,
        patterns: WatchPatterns,
    ) -> Result<Self> {
        dispatcher.store().snapshot().lookup(task)?;

        let root = root.into();
        let canonical_root = root.canonicalize().ok();

        Ok(Self {
            dispatcher,
            task: task.to_string(),
            options,
            root,
            canonical_root,
            patterns,
        })
    }

    /// Watch the filesystem until Ctrl-C
    pub async fn watch(self) -> Result<WatchReport> {
        let (handle, events) = self.subscribe()?;

        println!(
            "{} Watching for changes to run task '{}'",
            style("👀").cyan(),
            style(&self.task).bold()
        );
        println!("   Patterns: {}", style(self.patterns.patterns().join(", ")).dim());
        if !self.patterns.ignore().is_empty() {
            println!("   Ignoring: {}", style(self.patterns.ignore().join(", ")).dim());
        }

        let report = self.run_loop(events, tokio::signal::ctrl_c()).await;

        println!("{}", style("Stopping watcher...").blue());
        drop(handle);
        Ok(report)
    }

    /// Start the OS watcher on the root, forwarding events into a channel
    pub fn subscribe(&self) -> Result<(WatcherHandle, mpsc::UnboundedReceiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if tx.send(ChangeEvent::from(event)).is_err() {
                        debug!("watch channel closed, dropping event");
                    }
                }
                Err(e) => warn!("file watch error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| RunnerError::Watch { source: e })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| RunnerError::Watch { source: e })?;

        info!(root = %self.root.display(), "file watcher started");
        Ok((WatcherHandle { _inner: watcher }, rx))
    }

    /// Consume events until `shutdown` resolves or the event source closes.
    /// Runs in progress at that point are handed back, not awaited.
    pub async fn run_loop<S>(
        &self,
        mut events: mpsc::UnboundedReceiver<ChangeEvent>,
        shutdown: S,
    ) -> WatchReport
    where
        S: Future,
    {
        tokio::pin!(shutdown);
        let mut triggered = 0;
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("interrupt received, stopping watch");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("event source closed");
                        break;
                    };

                    let Some(path) = self.qualifying_path(&event) else {
                        continue;
                    };

                    println!("{} File changed: {}", style("📝").yellow(), path);
                    triggered += 1;
                    in_flight.retain(|h| !h.is_finished());
                    in_flight.push(self.spawn_run());
                }
            }
        }

        in_flight.retain(|h| !h.is_finished());
        WatchReport {
            triggered,
            in_flight,
        }
    }

    fn spawn_run(&self) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let task = self.task.clone();
        let options = self.options.clone();

        tokio::spawn(async move {
            match dispatcher.run(&task, &options).await {
                Ok(()) => println!("{} Task \"{}\" completed", style("✓").green(), task),
                Err(e) => eprintln!("{} Task \"{}\" failed: {}", style("✗").red(), task, e),
            }
        })
    }

    /// First path of the event that is watched and not ignored
    fn qualifying_path(&self, event: &ChangeEvent) -> Option<String> {
        if event.kind == ChangeKind::Other {
            return None;
        }

        event
            .paths
            .iter()
            .filter_map(|path| self.relative_str(path))
            .find(|rel| self.patterns.matches(rel))
    }

    /// Path relative to the root, with forward slashes
    fn relative_str(&self, path: &Path) -> Option<String> {
        let rel = path
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| {
                self.canonical_root
                    .as_deref()
                    .and_then(|root| path.strip_prefix(root).ok())
            })?;
        Some(rel.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::task::{FunctionError, Task};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn patterns(watch: &[&str], ignore: &[&str]) -> WatchPatterns {
        let watch: Vec<String> = watch.iter().map(|s| s.to_string()).collect();
        let ignore: Vec<String> = ignore.iter().map(|s| s.to_string()).collect();
        WatchPatterns::new(&watch, &ignore).unwrap()
    }

    fn counting_dispatcher(counter: &Arc<AtomicUsize>) -> Dispatcher {
        let counter = Arc::clone(counter);
        let mut config = Config::default();
        config.insert_task(Task::function("t", move |_options: RunOptions| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), FunctionError>(())
            }
        }));
        Dispatcher::from_config(config)
    }

    #[test]
    fn test_patterns_respect_ignore() {
        let p = patterns(&["src/**/*.rs", "*.toml"], &["src/generated/**"]);

        assert!(p.matches("src/main.rs"));
        assert!(p.matches("src/a/b/c.rs"));
        assert!(p.matches("Cargo.toml"));
        assert!(!p.matches("src/generated/schema.rs"));
        assert!(!p.matches("README.md"));
    }

    #[test]
    fn test_single_star_stays_in_one_segment() {
        let p = patterns(&["*.toml", "src/*.rs"], &["*.log"]);

        assert!(p.matches("Cargo.toml"));
        assert!(!p.matches("nested/x.toml"));
        assert!(p.matches("src/main.rs"));
        assert!(!p.matches("src/a/b.rs"));

        let all = patterns(&["**/*"], &["*.log"]);
        assert!(!all.matches("debug.log"));
        assert!(all.matches("logs/a.log"));
        assert!(all.matches("deep/nested/file.txt"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = WatchPatterns::new(&["src/[".to_string()], &[]);
        assert!(matches!(result, Err(RunnerError::InvalidPattern { .. })));
    }

    #[test]
    fn test_unknown_task_cannot_be_watched() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = WatchController::new(
            counting_dispatcher(&counter),
            "missing",
            RunOptions::default(),
            "/project",
            patterns(&["**/*"], &[]),
        );
        assert!(matches!(result, Err(RunnerError::TaskNotFound { .. })));
    }

    #[tokio::test]
    async fn test_one_run_per_qualifying_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let root = PathBuf::from("/project");
        let controller = WatchController::new(
            counting_dispatcher(&counter),
            "t",
            RunOptions::default(),
            &root,
            patterns(&["src/**"], &["src/ignored/**"]),
        )
        .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let events = [
            ChangeEvent::new(ChangeKind::Modified, vec![root.join("src/a.rs")]),
            ChangeEvent::new(ChangeKind::Modified, vec![root.join("src/ignored/b.rs")]),
            ChangeEvent::new(ChangeKind::Modified, vec![root.join("docs/readme.md")]),
            ChangeEvent::new(ChangeKind::Other, vec![root.join("src/a.rs")]),
            ChangeEvent::new(
                ChangeKind::Created,
                vec![root.join("src/c.rs"), root.join("src/d.rs")],
            ),
            ChangeEvent::new(ChangeKind::Modified, vec![PathBuf::from("/elsewhere/src/e.rs")]),
        ];
        for event in events {
            tx.send(event).unwrap();
        }
        drop(tx);

        let report = controller.run_loop(rx, std::future::pending::<()>()).await;
        for handle in report.in_flight {
            handle.await.unwrap();
        }

        assert_eq!(report.triggered, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_run_keeps_watching() {
        let mut config = Config::default();
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = Arc::clone(&runs);
            config.insert_task(Task::function("flaky", move |_options: RunOptions| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err::<(), FunctionError>("always fails".into())
                }
            }));
        }

        let root = PathBuf::from("/project");
        let controller = WatchController::new(
            Dispatcher::from_config(config),
            "flaky",
            RunOptions::default(),
            &root,
            patterns(&["**/*"], &[]),
        )
        .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        for name in ["a.txt", "b.txt", "c.txt"] {
            tx.send(ChangeEvent::new(ChangeKind::Modified, vec![root.join(name)]))
                .unwrap();
        }
        drop(tx);

        let report = controller.run_loop(rx, std::future::pending::<()>()).await;
        for handle in report.in_flight {
            handle.await.unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let controller = WatchController::new(
            counting_dispatcher(&counter),
            "t",
            RunOptions::default(),
            "/project",
            patterns(&["**/*"], &[]),
        )
        .unwrap();

        let (_tx, rx) = mpsc::unbounded_channel();
        let report = controller.run_loop(rx, std::future::ready(())).await;

        assert_eq!(report.triggered, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribe_sees_real_changes() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let controller = WatchController::new(
            counting_dispatcher(&counter),
            "t",
            RunOptions::default(),
            dir.path(),
            patterns(&["**/*.txt"], &[]),
        )
        .unwrap();

        let (_handle, mut rx) = controller.subscribe().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("watcher closed");
                if controller.qualifying_path(&event).is_some() {
                    return event;
                }
            }
        })
        .await
        .expect("no change event observed");

        assert_ne!(event.kind, ChangeKind::Other);
    }
}
