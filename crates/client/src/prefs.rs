//! Durable client-local key/value storage.
//!
//! A single JSON object on disk mapping string keys to string values, the
//! same contract a browser's local storage offers. Every write rewrites the
//! file; concurrent processes are last-writer-wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const DATA_DIR_ENV: &str = "FAMREPORT_DATA_DIR";
pub const STORAGE_FILE: &str = "local_storage.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data directory available")]
    NoDataDir,

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Directory holding client state: `FAMREPORT_DATA_DIR`, else
/// `<data dir>/famreport`.
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let mut dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
    dir.push("famreport");
    Ok(dir)
}

#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Load the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "corrupt local storage; starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable local storage; starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn open_default() -> Result<Self, StorageError> {
        Ok(Self::open(default_data_dir()?.join(STORAGE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Decode the value under `key`. Undecodable values are logged and read
    /// as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring undecodable stored value");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.into());
        })
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.set(key, raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keep only the keys `keep` accepts.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Result<(), StorageError> {
        self.mutate(|entries| entries.retain(|k, _| keep(k)))
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        f(&mut entries);
        self.persist(&entries)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries).map_err(|e| StorageError::Encode(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(STORAGE_FILE);

        let store = LocalStore::open(&path);
        store.set("lastCacheCleared", "2025-01-01T00:00:00Z").unwrap();
        store.set_json("numbers", &vec![1, 2, 3]).unwrap();

        let reopened = LocalStore::open(&path);
        assert_eq!(
            reopened.get("lastCacheCleared").as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(reopened.get_json::<Vec<u32>>("numbers"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORAGE_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let store = LocalStore::open(&path);
        assert!(store.keys().is_empty());
        store.set("a", "1").unwrap();
        assert_eq!(LocalStore::open(&path).get("a").as_deref(), Some("1"));
    }

    #[test]
    fn undecodable_value_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join(STORAGE_FILE));
        store.set("customWidgets", "[oops").unwrap();
        assert_eq!(store.get_json::<Vec<u32>>("customWidgets"), None);
    }

    #[test]
    fn retain_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join(STORAGE_FILE));
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.set("c", "3").unwrap();

        store.retain(|k| k != "b").unwrap();
        store.remove("c").unwrap();
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }
}
