/*!
Storage backends for persisted records.

This module defines the storage abstraction (port) and the two concrete
backends (adapters): direct filesystem storage and a simple persistent
key-value store. The engine picks one per call and uses it for every step of
that call.
*/

pub mod kv;
pub mod local;

use crate::config::SaveSettings;
use crate::Result;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

/// Which backend a call uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    FileSystem,
    KeyValue,
}

impl StorageMode {
    pub fn from_flag(use_key_value_store: bool) -> Self {
        if use_key_value_store {
            Self::KeyValue
        } else {
            Self::FileSystem
        }
    }
}

/// Names protected from delete and clear
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    files: HashSet<String>,
    directories: HashSet<String>,
}

impl IgnoreList {
    pub fn new<F, D>(files: F, directories: D) -> Self
    where
        F: IntoIterator<Item = String>,
        D: IntoIterator<Item = String>,
    {
        Self {
            files: files.into_iter().collect(),
            directories: directories.into_iter().collect(),
        }
    }

    pub fn from_settings(settings: &SaveSettings) -> Self {
        Self::new(
            settings.ignored_file_names.iter().cloned(),
            settings.ignored_directory_names.iter().cloned(),
        )
    }

    pub fn is_ignored_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    pub fn is_ignored_directory(&self, name: &str) -> bool {
        self.directories.contains(name)
    }

    /// True if the name is in either list
    pub fn is_ignored(&self, name: &str) -> bool {
        self.is_ignored_file(name) || self.is_ignored_directory(name)
    }
}

/// Storage abstraction for persisted records
///
/// `path` is the resolved location of a record: a filesystem path, or the
/// key under which the key-value store holds it.
pub trait StorageBackend: Send + Sync {
    /// Write a record, replacing any previous one
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Write a record by streaming into a sink
    ///
    /// The default implementation buffers in memory and calls
    /// [`StorageBackend::write`].
    fn write_with(
        &self,
        path: &str,
        fill: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let mut buffer = Vec::new();
        fill(&mut buffer)?;
        self.write(path, &buffer)
    }

    /// Read a record
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// True if a record (file or directory, or key) exists
    fn exists(&self, path: &str) -> bool;

    /// Remove a record; removing a missing record is not an error
    fn delete(&self, path: &str) -> Result<()>;

    /// Immediate child files, sorted, skipping ignored names
    fn list_files(&self, path: &str, ignored: &IgnoreList) -> Result<Vec<PathBuf>>;

    /// Immediate child directories, sorted, skipping ignored names
    fn list_directories(&self, path: &str, ignored: &IgnoreList) -> Result<Vec<PathBuf>>;

    /// Remove everything under `root` except ignored names
    ///
    /// # Returns
    /// The number of removed entries
    fn clear(&self, root: &str, ignored: &IgnoreList) -> Result<usize>;

    fn mode(&self) -> StorageMode;
}

// Re-export types for convenience
pub use kv::{KeyValueStorage, KeyValueStore};
pub use local::LocalFileStorage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_list() {
        let ignored = IgnoreList::from_settings(&SaveSettings::default());
        assert!(ignored.is_ignored_file("Player.log"));
        assert!(ignored.is_ignored_directory("Analytics"));
        assert!(ignored.is_ignored("output_log.txt"));
        assert!(!ignored.is_ignored("slot1"));
        assert!(!ignored.is_ignored_file("Analytics"));
    }

    #[test]
    fn test_storage_mode_from_flag() {
        assert_eq!(StorageMode::from_flag(true), StorageMode::KeyValue);
        assert_eq!(StorageMode::from_flag(false), StorageMode::FileSystem);
    }
}
