//! Declarative file operations
//!
//! Deletes and copies over glob patterns, expanded at the moment the task
//! runs. All work here is blocking; the dispatcher moves it off the runtime.

use std::path::{Path, PathBuf};

use console::style;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, RunnerError};
use crate::task::FileOps;

/// Applies [`FileOps`] relative to a base directory
#[derive(Debug, Clone)]
pub struct FileOperator {
    base: PathBuf,
}

impl FileOperator {
    /// Operator resolving relative paths against the current directory
    pub fn new() -> Self {
        Self {
            base: PathBuf::new(),
        }
    }

    /// Operator resolving relative paths against `base`
    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Run every delete, then every copy. The first failure stops the rest.
    pub fn apply(&self, ops: &FileOps, verbose: bool) -> Result<()> {
        for pattern in &ops.delete {
            self.delete(pattern, verbose)?;
        }

        for (src, dest) in &ops.copy {
            self.copy(src, dest, verbose)?;
        }

        Ok(())
    }

    fn delete(&self, pattern: &str, verbose: bool) -> Result<()> {
        let pattern = self.resolve(pattern, "delete")?;
        let matches = expand(&pattern, "delete")?;
        debug!(pattern = %pattern.display(), count = matches.len(), "delete expanded");

        for path in matches {
            // A directory removed earlier takes its children with it
            let Ok(meta) = std::fs::symlink_metadata(&path) else {
                continue;
            };

            if verbose {
                println!("{}", style(format!("Deleting: {}", path.display())).dim());
            }

            let removed = if meta.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };

            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(file_error("delete", &path, e)),
            }
        }

        Ok(())
    }

    fn copy(&self, src: &str, dest: &str, verbose: bool) -> Result<()> {
        let src_path = self.resolve(src, "copy")?;
        let dest_path = self.resolve(dest, "copy")?;

        if verbose {
            println!(
                "{}",
                style(format!("Copying: {} -> {}", src, dest)).dim()
            );
        }

        if !is_glob(src) {
            if !src_path.exists() {
                return Err(RunnerError::FileOp {
                    op: "copy",
                    path: src_path,
                    reason: "source does not exist".to_string(),
                });
            }
            return copy_path(&src_path, &dest_path);
        }

        let matches = expand(&src_path, "copy")?;
        if matches.is_empty() {
            return Err(RunnerError::FileOp {
                op: "copy",
                path: src_path,
                reason: "source pattern matched nothing".to_string(),
            });
        }

        for path in matches {
            let Some(name) = path.file_name() else {
                continue;
            };
            copy_path(&path, &dest_path.join(name))?;
        }

        Ok(())
    }

    /// Expand `~` and `$VAR`, then anchor relative paths at the base
    fn resolve(&self, raw: &str, op: &'static str) -> Result<PathBuf> {
        let expanded = shellexpand::full(raw).map_err(|e| RunnerError::FileOp {
            op,
            path: PathBuf::from(raw),
            reason: e.to_string(),
        })?;
        Ok(self.base.join(expanded.as_ref()))
    }
}

impl Default for FileOperator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn expand(pattern: &Path, op: &'static str) -> Result<Vec<PathBuf>> {
    let text = pattern.to_string_lossy();
    let paths = glob::glob(&text).map_err(|e| RunnerError::InvalidPattern {
        pattern: text.to_string(),
        reason: e.to_string(),
    })?;

    paths
        .map(|entry| {
            entry.map_err(|e| RunnerError::FileOp {
                op,
                path: e.path().to_path_buf(),
                reason: e.error().to_string(),
            })
        })
        .collect()
}

/// Copy a file or a directory tree, overwriting what is already there
fn copy_path(src: &Path, dest: &Path) -> Result<()> {
    if src.is_dir() {
        let src_real = src.canonicalize().map_err(|e| file_error("copy", src, e))?;
        if canonical_lenient(dest).starts_with(&src_real) {
            return Err(RunnerError::FileOp {
                op: "copy",
                path: dest.to_path_buf(),
                reason: "destination is inside source".to_string(),
            });
        }

        for entry in WalkDir::new(src) {
            let entry = entry.map_err(|e| RunnerError::FileOp {
                op: "copy",
                path: e.path().unwrap_or(src).to_path_buf(),
                reason: e.to_string(),
            })?;
            let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
            let target = dest.join(rel);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| file_error("copy", &target, e))?;
            } else {
                copy_file(entry.path(), &target)?;
            }
        }
        Ok(())
    } else {
        copy_file(src, dest)
    }
}

/// Canonical form of a path whose tail may not exist yet
fn canonical_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();

    loop {
        let probe = if existing.as_os_str().is_empty() {
            Path::new(".")
        } else {
            existing
        };
        if let Ok(real) = probe.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }

        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| file_error("copy", parent, e))?;
    }
    std::fs::copy(src, dest).map_err(|e| file_error("copy", src, e))?;
    Ok(())
}

fn file_error(op: &'static str, path: &Path, e: std::io::Error) -> RunnerError {
    RunnerError::FileOp {
        op,
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
