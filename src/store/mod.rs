//! State stores and the optional lock capability
//!
//! Every store implements [`StateStore`]. Stores that can guard their
//! backing medium against concurrent sessions also implement
//! [`StateLocker`] and expose it through [`StateStore::as_locker`].

mod backup;
mod local;
mod memory;

pub use backup::{BackupPhase, BackupStore};
pub use local::LocalStore;
pub use memory::InMemoryStore;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::StateSnapshot;

/// Errors related to reading and writing state
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported state version {found}, this build reads up to {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors related to state locking
#[derive(Error, Debug)]
pub enum LockError {
    #[error("State is locked: {0}")]
    Locked(Box<LockInfo>),

    #[error("State is not locked: {0}")]
    NotLocked(String),

    #[error("Lock id mismatch: held {held}, found {found}")]
    Mismatch { held: String, found: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Description of a held lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock ID
    pub id: String,

    /// What is locked
    pub path: String,

    /// Why the lock was taken
    pub reason: String,

    /// Who holds the lock
    pub who: String,

    /// When the lock was taken
    pub created: DateTime<Utc>,
}

impl LockInfo {
    /// Describe a new lock on `path`
    pub fn new(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        let who = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            id: Uuid::new_v4().to_string(),
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
            who,
            created: Utc::now(),
        }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID {}, held by {} since {}: {}",
            self.id, self.who, self.created, self.reason
        )
    }
}

/// Durable storage of a [`StateSnapshot`]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The snapshot the store currently holds, if any
    fn current_state(&self) -> Option<StateSnapshot>;

    /// Re-derive the current snapshot from the backing medium
    async fn refresh_state(&self) -> Result<(), StoreError>;

    /// Replace the store's snapshot
    async fn write_state(&self, state: &StateSnapshot) -> Result<(), StoreError>;

    /// Commit the store's current snapshot to durable storage
    async fn persist_state(&self) -> Result<(), StoreError>;

    /// Lock capability, when the store supports it
    fn as_locker(&self) -> Option<&dyn StateLocker> {
        None
    }
}

/// Advisory locking of a store's backing medium
#[async_trait]
pub trait StateLocker: Send + Sync {
    /// Acquire the lock, recording why it is held
    async fn lock(&self, reason: &str) -> Result<(), LockError>;

    /// Release the lock
    async fn unlock(&self) -> Result<(), LockError>;
}
