//! Hot-swappable holder for the active [`Config`].
//!
//! The store hands out [`Arc`] snapshots.  A snapshot taken before a reload
//! keeps describing the old configuration, which is what lets an armed
//! auto-close keep running the close command it was armed with.

use crate::config::{Config, ConfigError};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    active: Arc<Config>,
    path: PathBuf,
}

impl ConfigStore {
    /// Load the initial configuration from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self::new(config, path))
    }

    /// Wrap an already validated configuration.
    pub fn new(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            active: Arc::new(config),
            path: path.into(),
        }
    }

    /// A snapshot of the active configuration.
    pub fn current(&self) -> Arc<Config> {
        Arc::clone(&self.active)
    }

    /// Path the active configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load `candidate` (or the current path when `None`) and, only if that
    /// succeeds, make it the active configuration.
    ///
    /// On error both the configuration and the path stay as they were.
    pub fn reload(&mut self, candidate: Option<&Path>) -> Result<Arc<Config>, ConfigError> {
        let path = candidate.unwrap_or(self.path.as_path()).to_path_buf();
        let config = Config::load(&path)?;
        info!("reloaded config from {}", path.display());
        self.active = Arc::new(config);
        self.path = path;
        Ok(self.current())
    }
}
