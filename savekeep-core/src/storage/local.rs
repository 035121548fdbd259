/*!
Local filesystem storage backend.
*/

use super::{IgnoreList, StorageBackend, StorageMode};
use crate::{Result, SaveError};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Local filesystem storage backend
///
/// Records are files (or directories, for hierarchical saves) at their
/// resolved paths. Parent directories are created on write.
///
/// # Example
/// ```rust
/// use savekeep_core::storage::{LocalFileStorage, StorageBackend};
///
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("profile/slot1");
/// let path = path.to_str().unwrap();
///
/// let storage = LocalFileStorage::new();
/// storage.write(path, b"{\"score\":42}")?;
/// assert!(storage.exists(path));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage;

impl LocalFileStorage {
    pub fn new() -> Self {
        Self
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SaveError::storage(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn list_children(
        &self,
        path: &str,
        want_dirs: bool,
        ignored: &IgnoreList,
    ) -> Result<Vec<PathBuf>> {
        let dir = Path::new(path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            if is_dir != want_dirs {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            let skip = if is_dir {
                ignored.is_ignored_directory(&name)
            } else {
                ignored.is_ignored_file(&name)
            };
            if !skip {
                children.push(entry.path());
            }
        }

        children.sort();
        Ok(children)
    }
}

impl StorageBackend for LocalFileStorage {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(path);
        self.ensure_parent_dir(full_path)?;

        fs::write(full_path, data).map_err(|e| {
            SaveError::storage(format!(
                "Failed to write record to {}: {e}",
                full_path.display()
            ))
        })
    }

    fn write_with(
        &self,
        path: &str,
        fill: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let full_path = Path::new(path);
        self.ensure_parent_dir(full_path)?;

        let file = fs::File::create(full_path).map_err(|e| {
            SaveError::storage(format!(
                "Failed to create record {}: {e}",
                full_path.display()
            ))
        })?;
        let mut writer = BufWriter::new(file);
        let result = fill(&mut writer).and_then(|()| writer.flush().map_err(SaveError::from));
        drop(writer);

        if result.is_err() {
            // Remove the half-written record
            if let Err(e) = fs::remove_file(full_path) {
                tracing::warn!(path, "Failed to remove partial record: {e}");
            }
        }
        result
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path)
            .map_err(|e| SaveError::storage(format!("Failed to read record from {path}: {e}")))
    }

    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = Path::new(path);

        let result = if full_path.is_dir() {
            fs::remove_dir_all(full_path)
        } else if full_path.exists() {
            fs::remove_file(full_path)
        } else {
            return Ok(());
        };

        result.map_err(|e| {
            SaveError::storage(format!(
                "Failed to delete record {}: {e}",
                full_path.display()
            ))
        })
    }

    fn list_files(&self, path: &str, ignored: &IgnoreList) -> Result<Vec<PathBuf>> {
        self.list_children(path, false, ignored)
    }

    fn list_directories(&self, path: &str, ignored: &IgnoreList) -> Result<Vec<PathBuf>> {
        self.list_children(path, true, ignored)
    }

    fn clear(&self, root: &str, ignored: &IgnoreList) -> Result<usize> {
        let mut removed = 0;
        for file in self.list_files(root, ignored)? {
            fs::remove_file(&file).map_err(|e| {
                SaveError::storage(format!("Failed to delete {}: {e}", file.display()))
            })?;
            removed += 1;
        }
        for dir in self.list_directories(root, ignored)? {
            fs::remove_dir_all(&dir).map_err(|e| {
                SaveError::storage(format!("Failed to delete {}: {e}", dir.display()))
            })?;
            removed += 1;
        }

        tracing::debug!(root, removed, "Cleared filesystem records");
        Ok(removed)
    }

    fn mode(&self) -> StorageMode {
        StorageMode::FileSystem
    }
}
