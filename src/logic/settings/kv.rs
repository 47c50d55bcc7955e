//! Local key-value persistence
//!
//! The engine only needs get/set/remove over named keys. `get` returns
//! `None` for keys that were never written so callers can tell a first run
//! apart from an explicit `false`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::logic::error::StorageError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Process-local store, used by tests and the demo binary
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().remove(key);
        Ok(())
    }
}

// ============================================================================
// FILE-BACKED
// ============================================================================

/// JSON file holding a flat string map, rewritten on every mutation
pub struct FileKeyValueStore {
    file_path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or create) the store at the default per-user location
    pub fn open_default() -> Result<Self, StorageError> {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("telemetry-client");

        Self::open(data_dir.join("settings.json"))
    }

    /// Open (or create) the store at `file_path`
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        let cache = if file_path.exists() {
            let content =
                fs::read_to_string(&file_path).map_err(|e| StorageError::Io(e.to_string()))?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| StorageError::Parse(e.to_string()))?
            }
        } else {
            HashMap::new()
        };

        log::debug!("Settings store opened: {:?} ({} keys)", file_path, cache.len());

        Ok(Self {
            file_path,
            cache: Mutex::new(cache),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn write_out(&self, values: &HashMap<String, String>) -> Result<(), StorageError> {
        let content =
            serde_json::to_string_pretty(values).map_err(|e| StorageError::Parse(e.to_string()))?;

        // Atomic replace
        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp_path, &self.file_path).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.write_out(&cache)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_some() {
            self.write_out(&cache)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_distinguishes_unset() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "false").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("false"));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        {
            let store = FileKeyValueStore::open(&path).unwrap();
            store.set("telemetry.requested", "true").unwrap();
            store.set("telemetry.clientIdentifier", "abc").unwrap();
            store.remove("telemetry.clientIdentifier").unwrap();
        }

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("telemetry.requested").unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(reopened.get("telemetry.clientIdentifier").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileKeyValueStore::open(&path),
            Err(StorageError::Parse(_))
        ));
    }
}
