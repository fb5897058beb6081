use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{LockError, LockInfo, StateLocker, StateStore, StoreError};
use crate::state::StateSnapshot;

/// In-memory state storage.
///
/// Refresh and persist are no-ops. Locking is only offered when enabled with
/// [`InMemoryStore::with_locking`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<Option<StateSnapshot>>,
    lockable: bool,
    lock: Mutex<Option<LockInfo>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `state`
    pub fn with_state(state: StateSnapshot) -> Self {
        Self {
            state: RwLock::new(Some(state)),
            ..Self::default()
        }
    }

    /// Enable the lock capability
    pub fn with_locking(mut self) -> Self {
        self.lockable = true;
        self
    }

    /// The lock currently held, if any
    pub fn lock_info(&self) -> Option<LockInfo> {
        self.lock.lock().clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn current_state(&self) -> Option<StateSnapshot> {
        self.state.read().clone()
    }

    async fn refresh_state(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn write_state(&self, state: &StateSnapshot) -> Result<(), StoreError> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }

    async fn persist_state(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn as_locker(&self) -> Option<&dyn StateLocker> {
        if self.lockable {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl StateLocker for InMemoryStore {
    async fn lock(&self, reason: &str) -> Result<(), LockError> {
        let mut held = self.lock.lock();
        if let Some(existing) = held.as_ref() {
            return Err(LockError::Locked(Box::new(existing.clone())));
        }

        let info = LockInfo::new("memory", reason);
        debug!(lock_id = %info.id, reason, "in-memory state locked");
        *held = Some(info);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), LockError> {
        match self.lock.lock().take() {
            Some(info) => {
                debug!(lock_id = %info.id, "in-memory state unlocked");
                Ok(())
            }
            None => Err(LockError::NotLocked("memory".to_string())),
        }
    }
}
