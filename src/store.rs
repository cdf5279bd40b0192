//! Process-wide configuration store
//!
//! Holds an immutable [`Config`] snapshot. Reloading builds a new snapshot
//! and swaps it in; runs already in flight keep the one they started with.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, RunnerError};

/// Shared, reloadable configuration
#[derive(Debug)]
pub struct ConfigStore {
    /// Path override given at startup; `None` searches for runnel.toml
    path: Option<PathBuf>,
    /// Path the current snapshot was read from, if any
    source: RwLock<Option<PathBuf>>,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Store holding an already-built configuration
    pub fn from_config(config: Config) -> Self {
        Self {
            path: None,
            source: RwLock::new(None),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Load the configuration. A missing, unreadable or unparseable file is
    /// not fatal: a warning is logged and the store starts empty. Invalid
    /// task definitions are still errors.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let store = Self {
            path: path.map(Path::to_path_buf),
            source: RwLock::new(None),
            current: RwLock::new(Arc::new(Config::default())),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the configuration and replace the snapshot wholesale
    pub fn reload(&self) -> Result<Arc<Config>> {
        let (config, source) = match Config::load(self.path.as_deref()) {
            Ok((config, path)) => {
                debug!(path = %path.display(), "configuration loaded");
                (config, Some(path))
            }
            Err(e @ RunnerError::InvalidTaskConfig { .. }) => return Err(e),
            Err(e) => {
                warn!("could not load config file, continuing with no tasks: {}", e);
                (Config::default(), None)
            }
        };

        let snapshot = Arc::new(config);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&snapshot);
        *self.source.write().unwrap_or_else(|e| e.into_inner()) = source;
        Ok(snapshot)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Path the current snapshot came from
    pub fn source(&self) -> Option<PathBuf> {
        self.source.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
