/*!
Per-call options and the resolved snapshot the engine works from.
*/

use crate::cipher::Cipher;
use crate::codec::{Codec, TextEncoding};
use crate::config::BaseLocation;
use crate::storage::StorageMode;
use std::fmt;
use std::sync::Arc;

/// Per-call overrides
///
/// Every field is optional; unset fields take the engine's defaults.
///
/// # Example
/// ```rust
/// use savekeep_core::{BaseLocation, SaveOptions};
///
/// let options = SaveOptions::new()
///     .with_encrypt(true)
///     .with_password("hunter2")
///     .with_location(BaseLocation::SecondaryStorage);
/// assert_eq!(options.encrypt, Some(true));
/// ```
#[derive(Clone, Default)]
pub struct SaveOptions {
    pub encrypt: Option<bool>,
    pub password: Option<String>,
    pub codec: Option<Arc<dyn Codec>>,
    pub cipher: Option<Arc<dyn Cipher>>,
    pub encoding: Option<TextEncoding>,
    pub location: Option<BaseLocation>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that only pick a location
    pub fn at(location: BaseLocation) -> Self {
        Self::new().with_location(location)
    }

    pub fn with_encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = Some(encrypt);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_location(mut self, location: BaseLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn resolve(&self, defaults: &ResolvedOptions) -> ResolvedOptions {
        ResolvedOptions {
            encrypt: self.encrypt.unwrap_or(defaults.encrypt),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| defaults.password.clone()),
            codec: self
                .codec
                .clone()
                .unwrap_or_else(|| Arc::clone(&defaults.codec)),
            cipher: self
                .cipher
                .clone()
                .unwrap_or_else(|| Arc::clone(&defaults.cipher)),
            encoding: self.encoding.unwrap_or(defaults.encoding),
            location: self.location.unwrap_or(defaults.location),
            storage_mode: defaults.storage_mode,
        }
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("encrypt", &self.encrypt)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("codec", &self.codec.as_ref().map(|codec| codec.name().to_string()))
            .field("cipher", &self.cipher.as_ref().map(|_| "<custom>"))
            .field("encoding", &self.encoding)
            .field("location", &self.location)
            .finish()
    }
}

/// The effective options of one call
///
/// Built once at the start of a call and never changed while it runs; hooks
/// see exactly what the pipeline used.
#[derive(Clone)]
pub struct ResolvedOptions {
    pub encrypt: bool,
    pub password: String,
    pub codec: Arc<dyn Codec>,
    pub cipher: Arc<dyn Cipher>,
    pub encoding: TextEncoding,
    pub location: BaseLocation,
    pub storage_mode: StorageMode,
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("encrypt", &self.encrypt)
            .field("password", &"<redacted>")
            .field("codec", &self.codec.name())
            .field("encoding", &self.encoding)
            .field("location", &self.location)
            .field("storage_mode", &self.storage_mode)
            .finish_non_exhaustive()
    }
}
