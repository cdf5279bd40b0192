//! runnel - a declarative task runner
//!
//! Runs tasks from runnel.toml:
//! - Shell commands with extra environment
//! - Sequences and parallel groups of other tasks
//! - Rhai function tasks
//! - Glob-based file operations
//! - Watch mode

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands, GraphFormat, ListFormat};
use runnel::config::CONFIG_FILES;
use runnel::{
    Config, ConfigStore, Dispatcher, Result, RunOptions, RunnerError, TaskGraph,
    WatchController, WatchPatterns,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Run { task, verbose } => run_task(task, *verbose, &cli).await,

        Commands::List { format } => {
            let store = ConfigStore::load(cli.config.as_deref())?;
            print_task_list(&store.snapshot(), format.clone());
            Ok(())
        }

        Commands::Init { force } => init_config(cli.config.as_deref(), *force),

        Commands::Watch {
            task,
            patterns,
            ignore,
            verbose,
        } => watch_task(task, patterns, ignore, *verbose, &cli).await,

        Commands::Check => check_config(&cli),

        Commands::Graph { task, format } => {
            let (config, _) = Config::load(cli.config.as_deref())?;
            let graph = TaskGraph::from_config(&config);
            print_graph(&graph, task.as_deref(), format.clone())
        }
    }
}

fn run_options(verbose: bool, cli: &Cli) -> RunOptions {
    RunOptions {
        verbose,
        config: cli.config.clone(),
    }
}

async fn run_task(task: &str, verbose: bool, cli: &Cli) -> Result<()> {
    let store = Arc::new(ConfigStore::load(cli.config.as_deref())?);
    let dispatcher = Dispatcher::new(store);
    let options = run_options(verbose, cli);

    let start = Instant::now();
    let result = dispatcher.run(task, &options).await;
    // Siblings of a failed parallel member are left to finish
    dispatcher.drain().await;

    match &result {
        Ok(()) => println!(
            "{} {} {}",
            style("✓").green(),
            style(task).bold(),
            style(format!("{:.2}s", start.elapsed().as_secs_f64())).dim()
        ),
        Err(_) => eprintln!("{} {}", style("✗").red(), style(task).bold()),
    }

    result
}

async fn watch_task(
    task: &str,
    patterns: &[String],
    ignore: &[String],
    verbose: bool,
    cli: &Cli,
) -> Result<()> {
    let store = Arc::new(ConfigStore::load(cli.config.as_deref())?);
    let config = store.snapshot();

    let patterns = if patterns.is_empty() {
        config.watch.patterns.clone()
    } else {
        patterns.to_vec()
    };
    let ignore = if ignore.is_empty() {
        config.watch.ignore.clone()
    } else {
        ignore.to_vec()
    };

    let controller = WatchController::new(
        Dispatcher::new(store),
        task,
        run_options(verbose, cli),
        std::env::current_dir()?,
        WatchPatterns::new(&patterns, &ignore)?,
    )?;

    let report = controller.watch().await?;
    tracing::debug!(
        triggered = report.triggered,
        in_flight = report.in_flight.len(),
        "watch stopped"
    );
    Ok(())
}

fn print_task_list(config: &Config, format: ListFormat) {
    match format {
        ListFormat::Table => {
            println!("{}", style("Available tasks:").bold());
            println!();

            if config.is_empty() {
                println!(
                    "  {} {} {}",
                    style("No tasks configured. Run").yellow(),
                    style("runnel init").cyan(),
                    style("to create a configuration file.").yellow()
                );
                println!();
                return;
            }

            let names = config.task_names();
            let max_name_len = names.iter().map(|n| n.len()).max().unwrap_or(0);

            for name in names {
                if let Some(task) = config.get_task(name) {
                    let desc = task.description.as_deref().unwrap_or("No description");

                    println!(
                        "  {}{}  {} {}",
                        style(name).green().bold(),
                        " ".repeat(max_name_len - name.len()),
                        style(desc).dim(),
                        style(format!("[{}]", task.kind.label())).yellow().dim()
                    );
                }
            }
            println!();
        }

        ListFormat::Json => {
            let mut tasks = serde_json::Map::new();
            for name in config.sorted_task_names() {
                if let Some(task) = config.get_task(name) {
                    let mut obj = serde_json::Map::new();
                    obj.insert("kind".to_string(), serde_json::json!(task.kind.label()));
                    if let Some(desc) = &task.description {
                        obj.insert("description".to_string(), serde_json::json!(desc));
                    }
                    if !task.kind.members().is_empty() {
                        obj.insert("members".to_string(), serde_json::json!(task.kind.members()));
                    }
                    tasks.insert(name.to_string(), serde_json::Value::Object(obj));
                }
            }
            match serde_json::to_string_pretty(&tasks) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("could not render task list: {}", e),
            }
        }

        ListFormat::Plain => {
            for name in config.task_names() {
                println!("{}", name);
            }
        }
    }
}

fn check_config(cli: &Cli) -> Result<()> {
    let (config, path) = Config::load(cli.config.as_deref())?;
    let graph = TaskGraph::from_config(&config);

    for overlap in graph.parallel_overlaps() {
        println!(
            "{} parallel task '{}': '{}' ({}) and '{}' ({}) may touch the same files",
            style("warning").yellow().bold(),
            overlap.group,
            overlap.first.0,
            overlap.first.1,
            overlap.second.0,
            overlap.second.1,
        );
    }

    if let Some(missing) = graph.missing_references().first() {
        for reference in graph.missing_references() {
            eprintln!(
                "{} task '{}' references undefined task '{}'",
                style("✗").red(),
                reference.from,
                reference.to
            );
        }
        return Err(RunnerError::TaskNotFound {
            name: missing.to.clone(),
            available: graph.task_names().into_iter().map(String::from).collect(),
        });
    }

    if let Some(cycle) = graph.find_cycle() {
        return Err(RunnerError::CycleDetected { cycle });
    }

    println!(
        "{} {} is valid ({} tasks)",
        style("✓").green(),
        path.display(),
        graph.task_names().len()
    );
    Ok(())
}

fn print_graph(graph: &TaskGraph, task: Option<&str>, format: GraphFormat) -> Result<()> {
    let nodes = match task {
        Some(name) => {
            if graph.get_task(name).is_none() {
                return Err(RunnerError::TaskNotFound {
                    name: name.to_string(),
                    available: graph.task_names().into_iter().map(String::from).collect(),
                });
            }
            graph.reachable(name)
        }
        None => graph
            .task_names()
            .into_iter()
            .filter_map(|name| graph.get_task(name))
            .collect(),
    };

    match format {
        GraphFormat::Text => {
            println!("{}", style("Task graph:").bold());
            println!();

            for node in &nodes {
                if node.members.is_empty() {
                    println!(
                        "  {} {}",
                        style(&node.name).cyan().bold(),
                        style(format!("[{}]", node.kind)).dim()
                    );
                } else {
                    let joiner = if node.kind == "parallel" { " | " } else { " → " };
                    println!(
                        "  {} {} {}",
                        style(&node.name).cyan().bold(),
                        style("=").dim(),
                        node.members.join(joiner)
                    );
                }
            }
        }

        GraphFormat::Dot => {
            println!("digraph runnel {{");
            println!("  rankdir=LR;");
            println!("  node [shape=box];");

            for node in &nodes {
                for (i, (member, kind)) in graph.edges(&node.name).into_iter().enumerate() {
                    let attrs = match kind {
                        runnel::graph::EdgeKind::Sequence => format!("label=\"{}\"", i + 1),
                        runnel::graph::EdgeKind::Parallel => "style=dashed".to_string(),
                    };
                    println!("  \"{}\" -> \"{}\" [{}];", node.name, member, attrs);
                }
            }

            println!("}}");
        }

        GraphFormat::Json => {
            let mut json_nodes = Vec::new();
            let mut edges = Vec::new();

            for node in &nodes {
                json_nodes.push(serde_json::json!({
                    "id": node.name,
                    "kind": node.kind,
                    "description": node.description,
                }));

                for (member, kind) in graph.edges(&node.name) {
                    edges.push(serde_json::json!({
                        "from": node.name,
                        "to": member,
                        "parallel": kind == runnel::graph::EdgeKind::Parallel,
                    }));
                }
            }

            let output = serde_json::json!({
                "nodes": json_nodes,
                "edges": edges,
            });

            match serde_json::to_string_pretty(&output) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("could not render graph: {}", e),
            }
        }
    }

    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new(CONFIG_FILES[0]));

    if path.exists() && !force {
        return Err(RunnerError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", path.display()),
        )));
    }

    let template = r#"# runnel.toml - task runner configuration

[options]
verbose = false
parallel = false

# Environment added to every command task
[env]
# RUST_LOG = "info"

# Basic command task
[tasks.build]
description = "Build the project"
command = "cargo build --release"

# Sequential tasks
[tasks.deploy]
description = "Deploy the application"
sequence = ["build", "test", "upload"]

# Parallel tasks
[tasks.test]
description = "Run all tests"
parallel = ["test:unit", "test:integration"]

[tasks."test:unit"]
description = "Run unit tests"
command = "cargo test --lib"

[tasks."test:integration"]
description = "Run integration tests"
command = "cargo test --test '*'"

# Custom function task (Rhai script)
[tasks.upload]
description = "Upload build artifacts"
function = '''
    print("Uploading artifacts...");
    true
'''

# File operations
[tasks.clean]
description = "Clean build directory"
files = { delete = ["dist/**", "build/**"] }

# Environment-specific tasks
[tasks."dev:start"]
description = "Start development server"
command = "cargo run"
env = { APP_ENV = "development" }

# Watch configuration
[watch]
patterns = ["src/**/*.rs", "Cargo.toml"]
ignore = ["target/**", ".git/**"]
"#;

    std::fs::write(path, template)?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style(path.display()).bold()
    );

    Ok(())
}
