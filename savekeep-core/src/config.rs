//! Configuration module for engine defaults and base-location selection
//!
//! This module provides the serializable settings an engine is built from,
//! the base-location enum that selects a root directory, and the resolution
//! of those roots to concrete platform directories.

use crate::codec::TextEncoding;
use crate::{Result, SaveError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Enumeration of supported base locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaseLocation {
    /// Per-user persistent application data
    #[default]
    PrimaryStorage,
    /// Machine-local application data
    SecondaryStorage,
    /// Identifier is already a full path, no root is prefixed
    CustomPath,
}

impl BaseLocation {
    /// Parse a location name, accepting a few aliases.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "primary" | "primary_storage" | "persistent" => Some(Self::PrimaryStorage),
            "secondary" | "secondary_storage" | "data" => Some(Self::SecondaryStorage),
            "custom" | "custom_path" => Some(Self::CustomPath),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryStorage => "primary",
            Self::SecondaryStorage => "secondary",
            Self::CustomPath => "custom",
        }
    }
}

impl fmt::Display for BaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseLocation {
    type Err = SaveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| SaveError::validation(format!("Unknown base location: {s}")))
    }
}

/// How identifiers are mapped onto file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathConvention {
    /// `<root>/<identifier>`
    #[default]
    Flat,
    /// `<root>/<relative_path>/<identifier>.<file_extension>`
    Structured,
}

/// Application identity used for platform directories and the default password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationIdentity {
    pub qualifier: String,
    pub organization: String,
    pub name: String,
}

impl Default for ApplicationIdentity {
    fn default() -> Self {
        Self {
            qualifier: "io".to_string(),
            organization: "Savekeep".to_string(),
            name: "savekeep".to_string(),
        }
    }
}

impl ApplicationIdentity {
    pub fn new(qualifier: &str, organization: &str, name: &str) -> Self {
        Self {
            qualifier: qualifier.to_string(),
            organization: organization.to_string(),
            name: name.to_string(),
        }
    }

    /// Dotted identifier such as `io.Savekeep.savekeep`
    pub fn bundle_id(&self) -> String {
        format!("{}.{}.{}", self.qualifier, self.organization, self.name)
    }
}

/// Concrete root directories for each base location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRoots {
    pub primary: PathBuf,
    pub secondary: PathBuf,
    pub custom: Option<PathBuf>,
}

impl LocationRoots {
    /// Root directory for a location.
    ///
    /// `CustomPath` has no root of its own unless one was configured; in that
    /// case it falls back to the primary root with a warning.
    pub fn root(&self, location: BaseLocation) -> &Path {
        match location {
            BaseLocation::PrimaryStorage => &self.primary,
            BaseLocation::SecondaryStorage => &self.secondary,
            BaseLocation::CustomPath => match &self.custom {
                Some(custom) => custom,
                None => {
                    tracing::warn!(
                        "No root configured for the custom location, using the primary root"
                    );
                    &self.primary
                }
            },
        }
    }
}

/// Engine-wide settings
///
/// Every field has a default; per-call [`crate::SaveOptions`] override the
/// subset that can vary between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Identity used for platform directories and the derived password
    pub application: ApplicationIdentity,
    /// Default codec name (`json`, `json-pretty`, `gzip`)
    pub codec: String,
    /// Default cipher name (`simple`, `aes`)
    pub cipher: String,
    /// Text encoding handed to codecs
    pub encoding: TextEncoding,
    /// Encrypt payloads unless a call says otherwise
    pub encrypt_by_default: bool,
    /// Location used when a call does not pick one
    pub default_location: BaseLocation,
    /// Password for the cipher; derived from device identity when unset
    pub default_password: Option<String>,
    /// Report wrapped failures through `tracing::error!` before returning them
    pub log_errors: bool,
    /// Store records in the key-value store instead of files
    pub use_key_value_store: bool,
    /// File names never touched by delete or clear
    pub ignored_file_names: Vec<String>,
    /// Directory names never touched by delete or clear
    pub ignored_directory_names: Vec<String>,
    pub path_convention: PathConvention,
    /// Subfolder used by the structured convention
    pub relative_path: String,
    /// Extension used by the structured convention
    pub file_extension: String,
    pub primary_root: Option<PathBuf>,
    pub secondary_root: Option<PathBuf>,
    pub custom_root: Option<PathBuf>,
    /// Backing file for the key-value store; in-memory when unset
    pub key_value_store_path: Option<PathBuf>,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            application: ApplicationIdentity::default(),
            codec: "json".to_string(),
            cipher: "simple".to_string(),
            encoding: TextEncoding::Utf8,
            encrypt_by_default: false,
            default_location: BaseLocation::PrimaryStorage,
            default_password: None,
            log_errors: false,
            use_key_value_store: false,
            ignored_file_names: vec!["Player.log".to_string(), "output_log.txt".to_string()],
            ignored_directory_names: vec!["Analytics".to_string()],
            path_convention: PathConvention::Flat,
            relative_path: crate::path::DEFAULT_RELATIVE_PATH.to_string(),
            file_extension: crate::path::DEFAULT_FILE_EXTENSION.to_string(),
            primary_root: None,
            secondary_root: None,
            custom_root: None,
            key_value_store_path: None,
        }
    }
}

impl SaveSettings {
    /// Settings rooted at a single directory
    ///
    /// Primary storage is `<dir>/primary` and secondary storage is
    /// `<dir>/secondary`, which keeps everything in one place for tests and
    /// portable installs.
    pub fn with_root<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            primary_root: Some(dir.join("primary")),
            secondary_root: Some(dir.join("secondary")),
            ..Self::default()
        }
    }

    /// Parse settings from a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: SaveSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SaveError::storage(format!(
                "Failed to read settings from {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.application.name.trim().is_empty() {
            return Err(SaveError::validation("Application name must not be empty"));
        }

        if crate::codec::codec_by_name(&self.codec).is_none() {
            return Err(SaveError::validation(format!("Unknown codec: {}", self.codec)));
        }
        if crate::cipher::cipher_by_name(&self.cipher).is_none() {
            return Err(SaveError::validation(format!("Unknown cipher: {}", self.cipher)));
        }

        let has_separator = |name: &String| name.contains('/') || name.contains('\\');
        if let Some(name) = self
            .ignored_file_names
            .iter()
            .chain(self.ignored_directory_names.iter())
            .find(|name| name.is_empty() || has_separator(name))
        {
            return Err(SaveError::validation(format!(
                "Ignored names must be plain, non-empty file names: '{name}'"
            )));
        }

        if let Some(path) = &self.key_value_store_path {
            if path.is_dir() {
                return Err(SaveError::validation(format!(
                    "Key-value store path {} is a directory",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Backing file for the key-value store: the configured path, or
    /// `file_name` in the platform config directory
    ///
    /// The platform config directory is separate from every default record
    /// root.
    pub fn key_value_store_file(&self, file_name: &str) -> PathBuf {
        if let Some(path) = &self.key_value_store_path {
            return path.clone();
        }
        match directories::ProjectDirs::from(
            &self.application.qualifier,
            &self.application.organization,
            &self.application.name,
        ) {
            Some(dirs) => dirs.config_dir().join(file_name),
            None => {
                tracing::warn!("No platform config directory available, using ./{file_name}");
                PathBuf::from(file_name)
            }
        }
    }

    /// Resolve root directories, filling gaps from platform directories
    pub fn location_roots(&self) -> LocationRoots {
        let platform = directories::ProjectDirs::from(
            &self.application.qualifier,
            &self.application.organization,
            &self.application.name,
        );

        let fallback = || {
            tracing::warn!("No platform data directory available, using ./saves");
            PathBuf::from("saves")
        };

        let primary = self.primary_root.clone().unwrap_or_else(|| {
            platform
                .as_ref()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(fallback)
        });
        let secondary = self.secondary_root.clone().unwrap_or_else(|| {
            platform
                .as_ref()
                .map(|dirs| dirs.data_local_dir().join("data"))
                .unwrap_or_else(fallback)
        });

        LocationRoots {
            primary,
            secondary,
            custom: self.custom_root.clone(),
        }
    }
}
