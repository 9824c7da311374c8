//! Shared configuration store with atomic wholesale replacement.
//!
//! # Design Decisions
//! - The whole `Config` is swapped on reload, never patched field by field,
//!   so a reader can never observe a mix of old and new values
//! - Readers pay one atomic load per access; no lock is held while a reader
//!   inspects the snapshot it got

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::Config;
use crate::rules::{Action, RuleDuration};

/// Process-wide configuration, owned here and injected into every consumer.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<Config>,
}

impl ConfigStore {
    /// Read the config file once. A missing file is non-fatal: defaults
    /// apply and the daemon proceeds. Anything else (unreadable, malformed)
    /// is reported so the caller can decide.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) if e.is_not_found() => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(config),
        })
    }

    /// Build a store around an already-parsed configuration.
    pub fn with_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Path of the watched config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the entire configuration atomically.
    pub fn replace(&self, config: Config) {
        self.current.store(Arc::new(config));
    }

    /// Full snapshot of the current configuration.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.load_full()
    }

    pub fn server_address(&self) -> String {
        self.current.load().server.address.clone()
    }

    pub fn events_address(&self) -> String {
        self.current.load().server.events_address.clone()
    }

    pub fn default_action(&self) -> Action {
        self.current.load().default_action
    }

    pub fn default_duration(&self) -> RuleDuration {
        self.current.load().default_duration
    }

    pub fn intercept_unknown(&self) -> bool {
        self.current.load().intercept_unknown
    }

    /// Monitor method configured, empty when the file does not set one.
    pub fn proc_monitor_method(&self) -> String {
        self.current.load().proc_monitor_method.clone()
    }

    pub fn log_level(&self) -> Option<u32> {
        self.current.load().log_level
    }
}
