/*!
Key-value storage backend.

[`KeyValueStore`] is a string-to-string store that is either held in memory
or mirrored to a JSON file on every mutation. [`KeyValueStorage`] adapts it
to [`StorageBackend`], keying each record by its resolved path.
*/

use super::{IgnoreList, StorageBackend, StorageMode};
use crate::{Result, SaveError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A simple persistent string store
#[derive(Debug, Default)]
pub struct KeyValueStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store mirrored to `path`, loading existing entries if the
    /// file is present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                SaveError::storage(format!(
                    "Failed to read key-value store {}: {e}",
                    path.display()
                ))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened key-value store");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Backing file, if the store is persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| SaveError::storage("Key-value store lock poisoned"))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(entries)?;
        fs::write(path, content).map_err(|e| {
            SaveError::storage(format!(
                "Failed to write key-value store {}: {e}",
                path.display()
            ))
        })
    }

    /// Apply a change to a copy of the entries, flush it, then commit it
    ///
    /// A failed flush leaves the in-memory entries untouched.
    fn update<R>(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> Result<R> {
        let mut entries = self.lock()?;
        let mut updated = entries.clone();
        let outcome = change(&mut updated);
        self.flush(&updated)?;
        *entries = updated;
        Ok(outcome)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &str) -> Result<bool> {
        if !self.has(key) {
            return Ok(false);
        }
        self.update(|entries| entries.remove(key).is_some())
    }

    /// Remove every key, returning how many were removed
    pub fn delete_all(&self) -> Result<usize> {
        self.update(|entries| {
            let removed = entries.len();
            entries.clear();
            removed
        })
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`StorageBackend`] over a [`KeyValueStore`]
///
/// Records must be text. Listings are always empty and clear wipes the
/// whole store.
#[derive(Debug, Clone)]
pub struct KeyValueStorage {
    store: Arc<KeyValueStore>,
}

impl KeyValueStorage {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }
}

impl StorageBackend for KeyValueStorage {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(data)
            .map_err(|e| SaveError::storage(format!("Key-value records must be text: {e}")))?;
        self.store.set(path, text)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.store
            .get(path)?
            .map(String::into_bytes)
            .ok_or_else(|| SaveError::storage(format!("No key-value record for {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.store.has(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.store.delete(path)?;
        Ok(())
    }

    fn list_files(&self, _path: &str, _ignored: &IgnoreList) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn list_directories(&self, _path: &str, _ignored: &IgnoreList) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn clear(&self, _root: &str, _ignored: &IgnoreList) -> Result<usize> {
        let removed = self.store.delete_all()?;
        tracing::debug!(removed, "Cleared key-value store");
        Ok(removed)
    }

    fn mode(&self) -> StorageMode {
        StorageMode::KeyValue
    }
}
