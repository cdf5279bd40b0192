//! CLI command definitions
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// runnel - run declarative tasks from runnel.toml
#[derive(Parser, Debug)]
#[command(name = "runnel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true, arg_required_else_help = true)]
pub struct Cli {
    /// Path to runnel.toml config file
    #[arg(short, long, global = true, env = "RUNNEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a specific task
    Run {
        /// Task to run
        task: String,

        /// Stream command output and log each step
        #[arg(short, long)]
        verbose: bool,
    },

    /// List all available tasks
    #[command(visible_alias = "ls")]
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: ListFormat,
    },

    /// Initialize runner configuration
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Watch files and run task on changes
    Watch {
        /// Task to run on changes
        task: String,

        /// File pattern to watch (repeatable; overrides [watch] patterns)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,

        /// Pattern to ignore (repeatable; overrides [watch] ignore)
        #[arg(long = "ignore")]
        ignore: Vec<String>,

        /// Stream command output and log each step
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate task references in runnel.toml
    Check,

    /// Show how tasks compose each other
    Graph {
        /// Task to show graph for (all tasks if not specified)
        task: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: GraphFormat,
    },
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_flags() {
        let cli = Cli::try_parse_from(["runnel", "run", "build", "-v", "-c", "ci.toml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("ci.toml")));
        match cli.command {
            Commands::Run { task, verbose } => {
                assert_eq!(task, "build");
                assert!(verbose);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ls_alias() {
        let cli = Cli::try_parse_from(["runnel", "ls"]).unwrap();
        assert!(matches!(cli.command, Commands::List { .. }));
    }

    #[test]
    fn test_watch_patterns_repeat() {
        let cli = Cli::try_parse_from([
            "runnel", "watch", "test", "-p", "src/**/*.rs", "--pattern", "Cargo.toml",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch { task, patterns, ignore, .. } => {
                assert_eq!(task, "test");
                assert_eq!(patterns, vec!["src/**/*.rs", "Cargo.toml"]);
                assert!(ignore.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert!(Cli::try_parse_from(["runnel", "explode"]).is_err());
    }
}
