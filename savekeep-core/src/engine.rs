/*!
Main save engine that orchestrates save and load operations.

The engine wires a codec, a cipher, a path resolver and a storage backend
together behind one contract. Every call resolves its options once, picks the
storage backend once, and wraps pipeline failures exactly once at the engine
boundary.
*/

use crate::cipher::{cipher_by_name, default_password, Cipher};
use crate::codec::{codec_by_name, from_payload, to_payload, Codec};
use crate::config::{BaseLocation, PathConvention, SaveSettings};
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecycleStage};
#[cfg(feature = "metrics")]
use crate::observability::{MetricsTimer, Operation, SaveMetrics};
use crate::options::{ResolvedOptions, SaveOptions};
use crate::path::{FlatPathResolver, PathResolver, StructuredPathResolver};
use crate::storage::{
    IgnoreList, KeyValueStorage, KeyValueStore, LocalFileStorage, StorageBackend, StorageMode,
};
use crate::{Result, SaveError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main engine for save and load operations
///
/// # Example
/// ```rust
/// use savekeep_core::{SaveEngine, SaveOptions, SaveSettings};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
/// struct Progress {
///     score: u32,
/// }
///
/// let dir = tempfile::tempdir()?;
/// let engine = SaveEngine::new(SaveSettings::with_root(dir.path()))?;
///
/// engine.save("profile/slot1", &Progress { score: 42 }, &SaveOptions::new())?;
/// let loaded = engine.load("profile/slot1", Progress::default(), &SaveOptions::new())?;
/// assert_eq!(loaded, Progress { score: 42 });
/// # Ok::<(), savekeep_core::SaveError>(())
/// ```
pub struct SaveEngine {
    settings: SaveSettings,
    defaults: ResolvedOptions,
    resolver: Arc<dyn PathResolver>,
    files: LocalFileStorage,
    key_value: KeyValueStorage,
    ignored: IgnoreList,
    lifecycle: Lifecycle,
}

fn check_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(SaveError::InvalidIdentifier);
    }
    Ok(())
}

fn record_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn into_text(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw)
        .map_err(|e| SaveError::encoding(format!("Stored record is not valid UTF-8: {e}")))
}

impl SaveEngine {
    /// Create an engine from settings
    ///
    /// Validates the settings, resolves root directories, picks the path
    /// convention and opens the key-value store (in memory unless a backing
    /// file is configured).
    pub fn new(settings: SaveSettings) -> Result<Self> {
        settings.validate()?;

        let roots = settings.location_roots();
        let resolver: Arc<dyn PathResolver> = match settings.path_convention {
            PathConvention::Flat => Arc::new(FlatPathResolver::new(roots)),
            PathConvention::Structured => Arc::new(StructuredPathResolver::new(
                roots,
                &settings.relative_path,
                &settings.file_extension,
            )),
        };

        let store = match &settings.key_value_store_path {
            Some(path) => KeyValueStore::open(path)?,
            None => KeyValueStore::in_memory(),
        };

        let codec = codec_by_name(&settings.codec)
            .ok_or_else(|| SaveError::validation(format!("Unknown codec: {}", settings.codec)))?;
        let cipher = cipher_by_name(&settings.cipher)
            .ok_or_else(|| SaveError::validation(format!("Unknown cipher: {}", settings.cipher)))?;
        let password = settings
            .default_password
            .clone()
            .unwrap_or_else(|| default_password(&settings.application));

        let defaults = ResolvedOptions {
            encrypt: settings.encrypt_by_default,
            password,
            codec,
            cipher,
            encoding: settings.encoding,
            location: settings.default_location,
            storage_mode: StorageMode::from_flag(settings.use_key_value_store),
        };

        tracing::debug!(
            convention = ?settings.path_convention,
            storage_mode = ?defaults.storage_mode,
            codec = defaults.codec.name(),
            "Created save engine"
        );

        Ok(Self {
            ignored: IgnoreList::from_settings(&settings),
            settings,
            defaults,
            resolver,
            files: LocalFileStorage::new(),
            key_value: KeyValueStorage::new(Arc::new(store)),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Replace the default codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.defaults.codec = codec;
        self
    }

    /// Replace the default cipher
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.defaults.cipher = cipher;
        self
    }

    /// Replace the path resolver
    pub fn with_path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a shared key-value store
    pub fn with_key_value_store(mut self, store: Arc<KeyValueStore>) -> Self {
        self.key_value = KeyValueStorage::new(store);
        self
    }

    pub fn settings(&self) -> &SaveSettings {
        &self.settings
    }

    /// Options a call gets when it overrides nothing
    pub fn defaults(&self) -> &ResolvedOptions {
        &self.defaults
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn path_resolver(&self) -> &dyn PathResolver {
        self.resolver.as_ref()
    }

    pub fn key_value_store(&self) -> &Arc<KeyValueStore> {
        self.key_value.store()
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.defaults.storage_mode
    }

    fn backend(&self, mode: StorageMode) -> &dyn StorageBackend {
        match mode {
            StorageMode::FileSystem => &self.files,
            StorageMode::KeyValue => &self.key_value,
        }
    }

    fn report(&self, error: SaveError) -> SaveError {
        if self.settings.log_errors {
            match std::error::Error::source(&error) {
                Some(cause) => tracing::error!(cause = %cause, "{error}"),
                None => tracing::error!("{error}"),
            }
        }
        error
    }

    fn record_size(&self, size: usize) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = SaveMetrics::global() {
            metrics.record_payload_size(size);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = size;
    }

    /// Save a value under an identifier
    ///
    /// # Errors
    /// * `SaveError::InvalidIdentifier` - If the identifier is empty (nothing is written)
    /// * `SaveError::SaveFailed` - If any step of the pipeline fails; the cause is kept
    pub fn save<T>(&self, identifier: &str, value: &T, options: &SaveOptions) -> Result<()>
    where
        T: Serialize + Default,
    {
        self.save_option(identifier, Some(value), options)
    }

    /// Save a possibly absent value; `None` stores `T::default()`
    pub fn save_option<T>(
        &self,
        identifier: &str,
        value: Option<&T>,
        options: &SaveOptions,
    ) -> Result<()>
    where
        T: Serialize + Default,
    {
        check_identifier(identifier)?;
        let resolved = options.resolve(&self.defaults);

        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start(Operation::Save);

        let result = to_payload(value)
            .and_then(|payload| self.run_save(identifier, &payload, &resolved));

        #[cfg(feature = "metrics")]
        timer.observe(&result);

        result.map_err(|e| self.report(SaveError::save_failed(identifier, e)))
    }

    fn run_save(&self, identifier: &str, payload: &Value, options: &ResolvedOptions) -> Result<()> {
        let event = |stage| LifecycleEvent {
            stage,
            identifier,
            value: Some(payload),
            options,
        };
        self.lifecycle.emit(&event(LifecycleStage::BeforeSave));

        let key = record_key(&self.resolver.file_path(identifier, options.location));
        let backend = self.backend(options.storage_mode);

        if options.encrypt {
            let mut buffer = Vec::new();
            options
                .codec
                .serialize(payload, &mut buffer, options.encoding)?;
            let ciphertext = options
                .cipher
                .encode(&BASE64.encode(&buffer), &options.password)?;
            let bytes = match options.storage_mode {
                StorageMode::FileSystem => options.encoding.encode(&ciphertext),
                StorageMode::KeyValue => ciphertext.into_bytes(),
            };
            self.record_size(bytes.len());
            backend.write(&key, &bytes)?;
        } else {
            match options.storage_mode {
                StorageMode::FileSystem => backend.write_with(&key, &mut |sink| {
                    options.codec.serialize(payload, sink, options.encoding)
                })?,
                StorageMode::KeyValue => {
                    let mut buffer = Vec::new();
                    options
                        .codec
                        .serialize(payload, &mut buffer, options.encoding)?;
                    let text = options.encoding.decode(&buffer)?;
                    self.record_size(text.len());
                    backend.write(&key, text.as_bytes())?;
                }
            }
        }

        tracing::debug!(identifier, path = %key, encrypted = options.encrypt, "Saved record");

        self.lifecycle.emit(&event(LifecycleStage::SaveCallback));
        self.lifecycle.emit(&event(LifecycleStage::AfterSave));
        Ok(())
    }

    /// Load the value stored under an identifier
    ///
    /// Returns `default` when no record exists, or when the stored payload is
    /// empty or does not match `T`.
    ///
    /// # Errors
    /// * `SaveError::InvalidIdentifier` - If the identifier is empty
    /// * `SaveError::LoadFailed` - If reading, decoding or deserializing fails;
    ///   a wrong password shows up as a wrapped `DecodeFailed`
    pub fn load<T>(&self, identifier: &str, default: T, options: &SaveOptions) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        check_identifier(identifier)?;
        let resolved = options.resolve(&self.defaults);

        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start(Operation::Load);

        let result = self.run_load(identifier, default, &resolved);

        #[cfg(feature = "metrics")]
        timer.observe(&result);

        result.map_err(|e| self.report(SaveError::load_failed(identifier, e)))
    }

    fn run_load<T>(&self, identifier: &str, default: T, options: &ResolvedOptions) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.lifecycle.emit(&LifecycleEvent {
            stage: LifecycleStage::BeforeLoad,
            identifier,
            value: None,
            options,
        });

        let key = record_key(&self.resolver.file_path(identifier, options.location));
        let backend = self.backend(options.storage_mode);

        if !backend.exists(&key) {
            tracing::warn!(identifier, path = %key, "No record found, returning the default value");
            return Ok(default);
        }

        let raw = backend.read(&key)?;
        self.record_size(raw.len());

        let plain = if options.encrypt {
            let ciphertext = match options.storage_mode {
                StorageMode::FileSystem => options.encoding.decode(&raw)?,
                StorageMode::KeyValue => into_text(raw)?,
            };
            let encoded = options.cipher.decode(&ciphertext, &options.password)?;
            BASE64.decode(encoded.trim()).map_err(|e| {
                SaveError::decode_failed(format!("Decoded payload is not valid base64: {e}"))
            })?
        } else {
            match options.storage_mode {
                StorageMode::FileSystem => raw,
                StorageMode::KeyValue => options.encoding.encode(&into_text(raw)?),
            }
        };

        let payload = options
            .codec
            .deserialize(&mut plain.as_slice(), options.encoding)?;
        let value = from_payload::<T>(payload).unwrap_or(default);
        let result = serde_json::to_value(&value)?;

        tracing::debug!(identifier, path = %key, encrypted = options.encrypt, "Loaded record");

        let event = |stage| LifecycleEvent {
            stage,
            identifier,
            value: Some(&result),
            options,
        };
        self.lifecycle.emit(&event(LifecycleStage::LoadCallback));
        self.lifecycle.emit(&event(LifecycleStage::AfterLoad));
        Ok(value)
    }

    /// Check whether a record exists
    ///
    /// A missing record is `Ok(false)`, never an error.
    pub fn exists(&self, identifier: &str, location: Option<BaseLocation>) -> Result<bool> {
        check_identifier(identifier)?;
        let location = location.unwrap_or(self.defaults.location);
        let path = self.resolver.file_path(identifier, location);
        Ok(self.backend(self.storage_mode()).exists(&record_key(&path)))
    }

    /// Delete a record
    ///
    /// Deleting a missing record, or one whose name is on the ignore list,
    /// does nothing. Under the flat convention an identifier naming a
    /// directory removes it recursively.
    ///
    /// # Returns
    /// Whether anything was removed
    pub fn delete(&self, identifier: &str, location: Option<BaseLocation>) -> Result<bool> {
        check_identifier(identifier)?;
        let location = location.unwrap_or(self.defaults.location);
        let backend = self.backend(self.storage_mode());

        let path = self.resolver.file_path(identifier, location);
        let key = record_key(&path);
        if !backend.exists(&key) {
            tracing::debug!(identifier, path = %key, "Nothing to delete");
            return Ok(false);
        }

        let protected = path
            .file_name()
            .map(|name| self.ignored.is_ignored(&name.to_string_lossy()))
            .unwrap_or(false);
        if protected {
            tracing::debug!(identifier, path = %key, "Skipping protected record");
            return Ok(false);
        }

        backend.delete(&key).map_err(|e| self.report(e))?;
        tracing::debug!(identifier, path = %key, "Deleted record");
        Ok(true)
    }

    /// Remove every record under a location, keeping ignored names
    ///
    /// In key-value mode the whole store is wiped and the ignore list does
    /// not apply.
    ///
    /// # Returns
    /// The number of removed top-level entries (or keys)
    pub fn clear(&self, location: Option<BaseLocation>) -> Result<usize> {
        let location = location.unwrap_or(self.defaults.location);
        let mode = self.storage_mode();
        let root = record_key(&self.resolver.folder_path(location));

        let removed = self
            .backend(mode)
            .clear(&root, &self.ignored)
            .map_err(|e| self.report(e))?;

        tracing::info!(%location, removed, "Cleared saved records");
        Ok(removed)
    }

    /// Alias for [`SaveEngine::clear`]
    pub fn delete_all(&self, location: Option<BaseLocation>) -> Result<usize> {
        self.clear(location)
    }

    /// Files directly under `subpath` (the location root when `None`)
    ///
    /// Empty when the directory does not exist, and always empty in
    /// key-value mode.
    pub fn list_files(
        &self,
        subpath: Option<&str>,
        location: Option<BaseLocation>,
    ) -> Result<Vec<PathBuf>> {
        let location = location.unwrap_or(self.defaults.location);
        let dir = self
            .resolver
            .directory_path(subpath.unwrap_or_default(), location);
        self.backend(self.storage_mode())
            .list_files(&record_key(&dir), &self.ignored)
    }

    /// Directories directly under `subpath` (the location root when `None`)
    pub fn list_directories(
        &self,
        subpath: Option<&str>,
        location: Option<BaseLocation>,
    ) -> Result<Vec<PathBuf>> {
        let location = location.unwrap_or(self.defaults.location);
        let dir = self
            .resolver
            .directory_path(subpath.unwrap_or_default(), location);
        self.backend(self.storage_mode())
            .list_directories(&record_key(&dir), &self.ignored)
    }
}

#[cfg(feature = "async-rt")]
impl SaveEngine {
    /// [`SaveEngine::save`] on tokio's blocking pool
    ///
    /// Hooks fire on the worker thread in the same order as a synchronous
    /// save. Once started the save runs to completion.
    pub async fn save_async<T>(
        self: Arc<Self>,
        identifier: impl Into<String>,
        value: T,
        options: SaveOptions,
    ) -> Result<()>
    where
        T: Serialize + Default + Send + 'static,
    {
        let identifier = identifier.into();
        let task_identifier = identifier.clone();
        tokio::task::spawn_blocking(move || self.save(&task_identifier, &value, &options))
            .await
            .map_err(|e| {
                let cause = SaveError::Task(format!("Save task failed: {e}"));
                SaveError::save_failed(&identifier, cause)
            })?
    }

    /// [`SaveEngine::load`] on tokio's blocking pool
    pub async fn load_async<T>(
        self: Arc<Self>,
        identifier: impl Into<String>,
        default: T,
        options: SaveOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let identifier = identifier.into();
        let task_identifier = identifier.clone();
        tokio::task::spawn_blocking(move || self.load(&task_identifier, default, &options))
            .await
            .map_err(|e| {
                let cause = SaveError::Task(format!("Load task failed: {e}"));
                SaveError::load_failed(&identifier, cause)
            })?
    }
}

impl fmt::Debug for SaveEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveEngine")
            .field("settings", &self.settings)
            .field("defaults", &self.defaults)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Convenience function to create an engine with default settings
///
/// Records go to the platform data directories, serialized as compact JSON,
/// unencrypted.
///
/// # Example
/// ```rust,no_run
/// use savekeep_core::create_default_engine;
///
/// let engine = create_default_engine()?;
/// # Ok::<(), savekeep_core::SaveError>(())
/// ```
pub fn create_default_engine() -> Result<SaveEngine> {
    SaveEngine::new(SaveSettings::default())
}

/// Create an engine from settings, e.g. loaded with
/// [`SaveSettings::from_json_file`]
pub fn create_engine_from_settings(settings: SaveSettings) -> Result<SaveEngine> {
    SaveEngine::new(settings)
}
