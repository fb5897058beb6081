//! # State Backup
//!
//! State stores with a one-shot backup of the prior state.
//!
//! ## Overview
//!
//! A session reads the managed state from a store, mutates it, and writes it
//! back. [`store::BackupStore`] wraps the session's store so that the very
//! first write or persist copies the state that existed before the session
//! to a backup file. After that the wrapper only delegates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use state_backup::config::StateConfig;
//! use state_backup::StateStore;
//! use serde_json::json;
//!
//! # async fn example() -> state_backup::Result<()> {
//! let store = StateConfig::new("state.json").open();
//! store.refresh_state().await?;
//!
//! let mut state = store.current_state().unwrap_or_default();
//! state.set("replicas", json!(3));
//!
//! // state.json.backup now holds the state from before this write
//! store.write_state(&state).await?;
//! store.persist_state().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`state`]: Snapshot type and its JSON codec
//! - [`store`]: Store and lock contracts, in-memory, local-file and backup stores
//! - [`config`]: Session configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for state operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for state operations
#[derive(Error, Debug)]
pub enum Error {
    /// Reading, writing or persisting state failed
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// Acquiring or releasing a lock failed
    #[error("Lock error: {0}")]
    Lock(#[from] store::LockError),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

/// State snapshot module
pub mod state;

/// State stores module
pub mod store;

/// Session configuration module
pub mod config;

pub use config::StateConfig;
pub use state::StateSnapshot;
pub use store::{
    BackupPhase, BackupStore, InMemoryStore, LocalStore, LockError, LockInfo, StateLocker,
    StateStore, StoreError,
};
