//! One-shot backup of the prior state
//!
//! [`BackupStore`] wraps another store. The first `write_state` or
//! `persist_state` that goes through it copies the wrapped store's current
//! snapshot to a backup sink before delegating; later calls delegate
//! directly. Reads and refreshes never trigger a backup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{LocalStore, LockError, StateLocker, StateStore, StoreError};
use crate::state::StateSnapshot;

/// Whether the backup of a [`BackupStore`] has been taken.
///
/// The only transition is `Pending` to `BackedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    /// No backup attempt has completed yet
    Pending,
    /// The backup was written, or there was nothing to back up
    BackedUp,
}

/// Store decorator that backs up the prior state before the first mutation
pub struct BackupStore {
    /// The store being decorated
    real: Arc<dyn StateStore>,

    /// Receives the backup copy
    sink: Arc<dyn StateStore>,

    /// Location of the backup file when the sink is a local file
    backup_path: Option<PathBuf>,

    /// Held across the whole backup attempt so concurrent first writers
    /// produce a single attempt
    phase: Mutex<BackupPhase>,
}

impl BackupStore {
    /// Wrap `real`, backing up to a local file at `path`.
    ///
    /// An existing file at `path` is replaced by the backup.
    pub fn new(real: Arc<dyn StateStore>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sink = Arc::new(LocalStore::new(path.clone()));

        Self {
            real,
            sink,
            backup_path: Some(path),
            phase: Mutex::new(BackupPhase::Pending),
        }
    }

    /// Wrap `real`, backing up through an arbitrary sink
    pub fn with_sink(real: Arc<dyn StateStore>, sink: Arc<dyn StateStore>) -> Self {
        Self {
            real,
            sink,
            backup_path: None,
            phase: Mutex::new(BackupPhase::Pending),
        }
    }

    /// Backup file location, if backing up to a local file
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    pub async fn phase(&self) -> BackupPhase {
        *self.phase.lock().await
    }

    async fn ensure_backup(&self) -> Result<(), StoreError> {
        let mut phase = self.phase.lock().await;
        if *phase == BackupPhase::BackedUp {
            return Ok(());
        }

        // on error the phase stays pending and the next mutation retries
        self.backup().await?;
        *phase = BackupPhase::BackedUp;
        Ok(())
    }

    #[instrument(skip(self), fields(path = ?self.backup_path))]
    async fn backup(&self) -> Result<(), StoreError> {
        let state = match self.real.current_state() {
            Some(state) => Some(state),
            None => {
                self.real.refresh_state().await?;
                self.real.current_state()
            }
        };

        match state {
            Some(state) => {
                self.sink.write_state(&state).await?;
                info!(
                    serial = state.serial,
                    lineage = %state.lineage,
                    "backed up prior state"
                );
            }
            // nothing was ever stored, leave no backup file behind
            None => debug!("no prior state, skipping backup"),
        }

        Ok(())
    }
}

#[async_trait]
impl StateStore for BackupStore {
    fn current_state(&self) -> Option<StateSnapshot> {
        self.real.current_state()
    }

    async fn refresh_state(&self) -> Result<(), StoreError> {
        self.real.refresh_state().await
    }

    async fn write_state(&self, state: &StateSnapshot) -> Result<(), StoreError> {
        self.ensure_backup().await?;
        self.real.write_state(state).await
    }

    async fn persist_state(&self) -> Result<(), StoreError> {
        self.ensure_backup().await?;
        self.real.persist_state().await
    }

    // every session store is wrapped, so the wrapper must always be lockable
    fn as_locker(&self) -> Option<&dyn StateLocker> {
        Some(self)
    }
}

#[async_trait]
impl StateLocker for BackupStore {
    async fn lock(&self, reason: &str) -> Result<(), LockError> {
        match self.real.as_locker() {
            Some(locker) => locker.lock(reason).await,
            None => {
                debug!(reason, "wrapped store does not support locking");
                Ok(())
            }
        }
    }

    async fn unlock(&self) -> Result<(), LockError> {
        match self.real.as_locker() {
            Some(locker) => locker.unlock().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that fails a set number of times before accepting writes
    #[derive(Default)]
    struct RecordingSink {
        failures_left: AtomicUsize,
        written: SyncMutex<Vec<StateSnapshot>>,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        fn writes(&self) -> Vec<StateSnapshot> {
            self.written.lock().clone()
        }
    }

    #[async_trait]
    impl StateStore for RecordingSink {
        fn current_state(&self) -> Option<StateSnapshot> {
            self.written.lock().last().cloned()
        }

        async fn refresh_state(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn write_state(&self, state: &StateSnapshot) -> Result<(), StoreError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Backend("sink unavailable".to_string()));
            }

            tokio::task::yield_now().await;
            self.written.lock().push(state.clone());
            Ok(())
        }

        async fn persist_state(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn snapshot(n: i64) -> StateSnapshot {
        StateSnapshot::new().with_value("n", json!(n))
    }

    #[tokio::test]
    async fn test_phase_transitions_once() {
        let real = Arc::new(InMemoryStore::with_state(snapshot(1)));
        let sink = Arc::new(RecordingSink::default());
        let store = BackupStore::with_sink(real, sink.clone());

        assert_eq!(store.phase().await, BackupPhase::Pending);
        store.write_state(&snapshot(2)).await.unwrap();
        assert_eq!(store.phase().await, BackupPhase::BackedUp);
        store.persist_state().await.unwrap();
        store.write_state(&snapshot(3)).await.unwrap();

        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_failed_backup_stays_pending() {
        let real = Arc::new(InMemoryStore::with_state(snapshot(1)));
        let sink = Arc::new(RecordingSink::failing(1));
        let store = BackupStore::with_sink(real.clone(), sink.clone());

        let err = store.write_state(&snapshot(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(ref msg) if msg == "sink unavailable"));
        assert_eq!(store.phase().await, BackupPhase::Pending);
        assert_eq!(real.current_state().unwrap().get("n"), Some(&json!(1)));

        store.write_state(&snapshot(2)).await.unwrap();
        assert_eq!(store.phase().await, BackupPhase::BackedUp);
        assert_eq!(sink.writes().len(), 1);
        assert_eq!(real.current_state().unwrap().get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_empty_state_skips_backup() {
        let real = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let store = BackupStore::with_sink(real, sink.clone());

        store.persist_state().await.unwrap();

        assert_eq!(store.phase().await, BackupPhase::BackedUp);
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_back_up_once() {
        let real = Arc::new(InMemoryStore::with_state(snapshot(1)));
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(BackupStore::with_sink(real, sink.clone()));

        let first = snapshot(2);
        let second = snapshot(3);
        let (a, b) = tokio::join!(store.write_state(&first), store.write_state(&second));
        a.unwrap();
        b.unwrap();

        assert_eq!(sink.writes().len(), 1);
        assert_eq!(sink.writes()[0].get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_reads_never_back_up() {
        let real = Arc::new(InMemoryStore::with_state(snapshot(1)));
        let sink = Arc::new(RecordingSink::default());
        let store = BackupStore::with_sink(real, sink.clone());

        for _ in 0..3 {
            store.refresh_state().await.unwrap();
            assert!(store.current_state().is_some());
        }

        assert_eq!(store.phase().await, BackupPhase::Pending);
        assert!(sink.writes().is_empty());
    }

    #[test]
    fn test_backup_path() {
        let real: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let store = BackupStore::new(real.clone(), "state.json.backup");
        assert_eq!(store.backup_path(), Some(Path::new("state.json.backup")));

        let sink: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let store = BackupStore::with_sink(real, sink);
        assert!(store.backup_path().is_none());
    }
}
