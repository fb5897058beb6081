// Local file storage - one JSON state file plus a lock-info file next to it

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{LockError, LockInfo, StateLocker, StateStore, StoreError};
use crate::state::{codec, StateSnapshot};

#[derive(Debug, Default)]
struct LocalInner {
    /// Snapshot handed out by `current_state`
    state: Option<StateSnapshot>,

    /// Last snapshot read from or written to disk, used for serial bumps
    read_state: Option<StateSnapshot>,

    /// Lock held by this instance
    lock: Option<LockInfo>,
}

/// State stored in a single file on the local filesystem.
///
/// Writes go to the output path when one is set, otherwise back to the input
/// path. Every write replaces the file wholesale.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    path_out: Option<PathBuf>,
    inner: RwLock<LocalInner>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            path_out: None,
            inner: RwLock::new(LocalInner::default()),
        }
    }

    /// Write to `path_out` instead of the input path
    pub fn with_output(mut self, path_out: impl Into<PathBuf>) -> Self {
        self.path_out = Some(path_out.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where writes land
    pub fn output_path(&self) -> &Path {
        self.path_out.as_deref().unwrap_or(&self.path)
    }

    /// Lock-info file for this state file, e.g. `.state.json.lock.info`
    pub fn lock_info_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.path.with_file_name(format!(".{}.lock.info", name))
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

#[async_trait]
impl StateStore for LocalStore {
    fn current_state(&self) -> Option<StateSnapshot> {
        self.inner.read().state.clone()
    }

    async fn refresh_state(&self) -> Result<(), StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let state = codec::decode(&bytes)?;
        debug!(
            path = %self.path.display(),
            present = state.is_some(),
            "refreshed local state"
        );

        let mut inner = self.inner.write();
        inner.read_state = state.clone();
        inner.state = state;
        Ok(())
    }

    async fn write_state(&self, state: &StateSnapshot) -> Result<(), StoreError> {
        let mut next = state.clone();
        {
            let inner = self.inner.read();
            next.increment_serial_maybe(inner.read_state.as_ref());
        }

        let bytes = codec::encode(&next)?;
        let target = self.output_path();

        ensure_parent(target).await?;
        let mut file = fs::File::create(target).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        debug!(path = %target.display(), serial = next.serial, "wrote local state");

        let mut inner = self.inner.write();
        inner.read_state = Some(next.clone());
        inner.state = Some(next);
        Ok(())
    }

    async fn persist_state(&self) -> Result<(), StoreError> {
        // writes are synced as they happen
        Ok(())
    }

    fn as_locker(&self) -> Option<&dyn StateLocker> {
        Some(self)
    }
}

#[async_trait]
impl StateLocker for LocalStore {
    async fn lock(&self, reason: &str) -> Result<(), LockError> {
        let held = self.inner.read().lock.clone();
        if let Some(held) = held {
            return Err(LockError::Locked(Box::new(held)));
        }

        let info = LockInfo::new(&self.path, reason);
        let lock_path = self.lock_info_path();
        ensure_parent(&lock_path).await?;

        let opened = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await;

        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = fs::read(&lock_path).await?;
                let holder: LockInfo = serde_json::from_slice(&existing)?;
                return Err(LockError::Locked(Box::new(holder)));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&serde_json::to_vec_pretty(&info)?).await?;
        file.sync_all().await?;

        info!(path = %self.path.display(), lock_id = %info.id, reason, "state locked");
        self.inner.write().lock = Some(info);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), LockError> {
        let held = self.inner.read().lock.clone();
        let Some(held) = held else {
            return Err(LockError::NotLocked(self.path.display().to_string()));
        };

        let lock_path = self.lock_info_path();
        let bytes = fs::read(&lock_path).await?;
        let found: LockInfo = serde_json::from_slice(&bytes)?;
        if found.id != held.id {
            return Err(LockError::Mismatch {
                held: held.id,
                found: found.id,
            });
        }

        fs::remove_file(&lock_path).await?;
        info!(path = %self.path.display(), lock_id = %held.id, "state unlocked");
        self.inner.write().lock = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lock_info_path() {
        let store = LocalStore::new("/var/lib/app/state.json");
        assert_eq!(
            store.lock_info_path(),
            PathBuf::from("/var/lib/app/.state.json.lock.info")
        );
    }

    #[test]
    fn test_output_path_defaults_to_input() {
        let store = LocalStore::new("in.json");
        assert_eq!(store.output_path(), Path::new("in.json"));

        let store = store.with_output("out.json");
        assert_eq!(store.output_path(), Path::new("out.json"));
        assert_eq!(store.path(), Path::new("in.json"));
    }

    #[tokio::test]
    async fn test_refresh_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("absent.json"));

        store.refresh_state().await.unwrap();
        assert!(store.current_state().is_none());
    }

    #[tokio::test]
    async fn test_write_does_not_mutate_caller_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let original = StateSnapshot::new().with_value("a", json!(1));
        let store = LocalStore::new(&path);
        store.write_state(&original).await.unwrap();

        let changed = original.clone().with_value("b", json!(2));
        store.write_state(&changed).await.unwrap();

        assert_eq!(changed.serial, 0);
        assert_eq!(store.current_state().unwrap().serial, 1);
    }
}
