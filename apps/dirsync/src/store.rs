//! File-backed key-value store.
//!
//! The state file is a flat JSON object of string values. Every `put`
//! rewrites it through a temporary file and a rename. A sibling `.lock` file,
//! created with `create_new`, keeps a second process out for as long as the
//! store is open.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::traits::KeyValueStore;

/// Removes the lock file when dropped.
#[derive(Debug)]
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: PathBuf) -> ConnectorResult<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ConnectorError::store_unavailable(format!(
                    "{} is held by another run",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(ConnectorError::store_unavailable_with_source(
                    format!("cannot create {}", path.display()),
                    e,
                ));
            }
        };

        let guard = Self { path };
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!(lock = %guard.path.display(), error = %e, "Could not record pid in lock file");
        }
        Ok(guard)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

/// Watermarks and counters persisted in a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    _lock: LockGuard,
}

impl FileStore {
    /// Lock and load the state file. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> ConnectorResult<Self> {
        let path = path.into();
        let lock = LockGuard::acquire(sibling(&path, ".lock"))?;

        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ConnectorError::store_unavailable_with_source(
                    format!("cannot read {}", path.display()),
                    e,
                ));
            }
        };
        debug!(path = %path.display(), keys = values.len(), "State file opened");

        Ok(Self {
            path,
            values: Mutex::new(values),
            _lock: lock,
        })
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &BTreeMap<String, String>) -> ConnectorResult<()> {
        let temp = sibling(&self.path, ".tmp");
        let content = serde_json::to_vec_pretty(values)?;

        tokio::fs::write(&temp, content).await.map_err(|e| {
            ConnectorError::store_unavailable_with_source(
                format!("cannot write {}", temp.display()),
                e,
            )
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            ConnectorError::store_unavailable_with_source(
                format!("cannot replace {}", self.path.display()),
                e,
            )
        })
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> ConnectorResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> ConnectorResult<()> {
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next).await?;
        *values = next;
        debug!(key = %key, "State persisted");
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("highestCommittedUSN").await.unwrap(), None);
            store.put("highestCommittedUSN", "42").await.unwrap();
            store.put("maintenance.uidNumber", "20001").await.unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            store.get("highestCommittedUSN").await.unwrap().as_deref(),
            Some("42")
        );
        assert_eq!(
            store.get("maintenance.uidNumber").await.unwrap().as_deref(),
            Some("20001")
        );
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[tokio::test]
    async fn test_second_open_is_refused_while_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let held = FileStore::open(&path).unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, ConnectorError::StoreUnavailable { .. }));

        drop(held);
        assert!(!sibling(&path, ".lock").exists());
        assert!(FileStore::open(&path).is_ok());
    }

    #[test]
    fn test_corrupt_state_file_releases_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
        assert!(!sibling(&path, ".lock").exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir(&state_dir).unwrap();
        let path = state_dir.join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.put("maintenance.uidNumber", "100").await.unwrap();

        std::fs::remove_dir_all(&state_dir).unwrap();
        let err = store.put("maintenance.uidNumber", "101").await.unwrap_err();
        assert!(matches!(err, ConnectorError::StoreUnavailable { .. }));

        assert_eq!(
            store.get("maintenance.uidNumber").await.unwrap().as_deref(),
            Some("100")
        );
    }

    #[tokio::test]
    async fn test_state_file_is_flat_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.put("oldUSN", "7").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["oldUSN"], "7");
    }
}
