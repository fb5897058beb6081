//! Session configuration
//!
//! Describes where a session reads and writes its state and where the
//! one-shot backup goes, and builds the store stack from that.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::store::{BackupStore, LocalStore, StateStore};

/// Default state file name
pub const DEFAULT_STATE_PATH: &str = "state.json";

/// Appended to the output path to form the default backup path
pub const DEFAULT_BACKUP_EXTENSION: &str = ".backup";

/// Backup path value that disables backups
pub const BACKUP_DISABLED: &str = "-";

/// Errors related to loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration for a state session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// State file read at the start of the session
    pub state_path: PathBuf,

    /// State file written during the session, defaults to `state_path`
    pub state_out_path: Option<PathBuf>,

    /// Backup file, `"-"` to disable. Defaults to the output path with
    /// `.backup` appended.
    pub backup_path: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            state_out_path: None,
            backup_path: None,
        }
    }
}

impl StateConfig {
    /// Config for the given state file with default output and backup paths
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_out_path = Some(path.into());
        self
    }

    pub fn with_backup(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    /// Disable the one-shot backup
    pub fn without_backup(self) -> Self {
        self.with_backup(BACKUP_DISABLED)
    }

    /// Where the session writes state
    pub fn output_path(&self) -> &Path {
        self.state_out_path.as_deref().unwrap_or(&self.state_path)
    }

    /// Effective backup path, `None` when backups are disabled
    pub fn backup_path(&self) -> Option<PathBuf> {
        match &self.backup_path {
            Some(path) if path.as_os_str() == BACKUP_DISABLED => None,
            Some(path) => Some(path.clone()),
            None => {
                let mut path: OsString = self.output_path().as_os_str().to_owned();
                path.push(DEFAULT_BACKUP_EXTENSION);
                Some(PathBuf::from(path))
            }
        }
    }

    /// Build the store for a session.
    ///
    /// Each call returns a fresh stack, so each session gets its own backup.
    pub fn open(&self) -> Arc<dyn StateStore> {
        let mut local = LocalStore::new(&self.state_path);
        if let Some(out) = &self.state_out_path {
            local = local.with_output(out);
        }
        let local: Arc<dyn StateStore> = Arc::new(local);

        match self.backup_path() {
            Some(backup) => {
                debug!(state = %self.state_path.display(), backup = %backup.display(), "opening state with backup");
                Arc::new(BackupStore::new(local, backup))
            }
            None => {
                debug!(state = %self.state_path.display(), "opening state without backup");
                local
            }
        }
    }
}
