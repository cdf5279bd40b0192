//! Rhai scripting for function tasks
//!
//! A `function` task in runnel.toml is a Rhai script. It is compiled when the
//! configuration loads and evaluated on a blocking thread when the task runs.
//! The script fails the task by throwing or by evaluating to `false`.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};

use crate::error::{Result, RunnerError};
use crate::task::{FunctionError, RunOptions, TaskFunction};

/// A compiled Rhai script bound to a task
#[derive(Clone)]
pub struct ScriptFunction {
    task: String,
    ast: Arc<AST>,
}

impl std::fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl ScriptFunction {
    /// Compile a script; syntax errors are reported as an invalid task
    pub fn compile(task: &str, script: &str) -> Result<Self> {
        let ast = create_engine()
            .compile(script)
            .map_err(|e| RunnerError::invalid_task(task, format!("script error: {}", e)))?;

        Ok(Self {
            task: task.to_string(),
            ast: Arc::new(ast),
        })
    }

    /// Evaluate the script synchronously
    pub fn evaluate(&self, options: &RunOptions) -> std::result::Result<(), Box<EvalAltResult>> {
        let mut scope = Scope::new();

        let mut opts = rhai::Map::new();
        opts.insert("verbose".into(), Dynamic::from(options.verbose));
        opts.insert(
            "config".into(),
            options
                .config
                .as_ref()
                .map(|p| Dynamic::from(p.to_string_lossy().to_string()))
                .unwrap_or(Dynamic::UNIT),
        );
        scope.push("options", opts);

        let env_map: rhai::Map = std::env::vars()
            .map(|(k, v)| (k.into(), Dynamic::from(v)))
            .collect();
        scope.push("env", env_map);

        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        scope.push("cwd", cwd);

        let result: Dynamic = create_engine().eval_ast_with_scope(&mut scope, &self.ast)?;

        if result.as_bool() == Ok(false) {
            return Err(format!("function '{}' returned false", self.task).into());
        }
        Ok(())
    }
}

impl TaskFunction for ScriptFunction {
    fn call(&self, options: RunOptions) -> BoxFuture<'static, std::result::Result<(), FunctionError>> {
        let script = self.clone();
        async move {
            tokio::task::spawn_blocking(move || script.evaluate(&options))
                .await
                .map_err(|e| -> FunctionError { e.into() })?
                .map_err(|e| -> FunctionError { e.to_string().into() })
        }
        .boxed()
    }
}

/// Create a configured engine instance
fn create_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 64);
    engine.set_max_modules(10);
    engine.set_max_string_size(1024 * 1024);

    register_stdlib(&mut engine);
    engine
}

/// Register the helper functions available to scripts
fn register_stdlib(engine: &mut Engine) {
    engine.register_fn("read_file", |path: &str| -> std::result::Result<String, Box<EvalAltResult>> {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path, e).into())
    });

    engine.register_fn(
        "write_file",
        |path: &str, content: &str| -> std::result::Result<(), Box<EvalAltResult>> {
            std::fs::write(path, content)
                .map_err(|e| format!("Failed to write file '{}': {}", path, e).into())
        },
    );

    engine.register_fn("file_exists", |path: &str| -> bool {
        std::path::Path::new(path).exists()
    });

    engine.register_fn("mkdir", |path: &str| -> std::result::Result<(), Box<EvalAltResult>> {
        std::fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory '{}': {}", path, e).into())
    });

    engine.register_fn("exec", |cmd: &str| -> std::result::Result<String, Box<EvalAltResult>> {
        let output = if cfg!(windows) {
            std::process::Command::new("cmd").args(["/C", cmd]).output()
        } else {
            std::process::Command::new("sh").args(["-c", cmd]).output()
        };

        match output {
            Ok(o) if o.status.success() => Ok(String::from_utf8_lossy(&o.stdout).to_string()),
            Ok(o) => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                Err(format!("Command failed: {}", stderr).into())
            }
            Err(e) => Err(format!("Failed to execute command: {}", e).into()),
        }
    });

    engine.register_fn("get_env", |key: &str| -> String {
        std::env::var(key).unwrap_or_default()
    });

    engine.register_fn("glob", |pattern: &str| -> std::result::Result<rhai::Array, Box<EvalAltResult>> {
        let paths: Vec<_> = glob::glob(pattern)
            .map_err(|e| format!("Invalid glob pattern: {}", e))?
            .filter_map(|p| p.ok())
            .map(|p| Dynamic::from(p.to_string_lossy().to_string()))
            .collect();
        Ok(paths)
    });
}
