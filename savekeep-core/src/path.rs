/*!
Path resolution: mapping identifiers and base locations to storage paths.

Two conventions are provided. [`FlatPathResolver`] places a record at
`<root>/<identifier>`; [`StructuredPathResolver`] places it at
`<root>/<relative_path>/<identifier>.<extension>`. An engine uses exactly one
resolver for every operation, so a record saved under one convention is only
visible through that convention.
*/

use crate::config::{BaseLocation, LocationRoots};
use std::any::Any;
use std::path::{Path, PathBuf};

pub const DEFAULT_RELATIVE_PATH: &str = "Saves";
pub const DEFAULT_FILE_EXTENSION: &str = "sav";

/// True if the identifier is already a concrete path (absolute or rooted)
/// and must be used verbatim.
pub fn is_concrete_path(identifier: &str) -> bool {
    let path = Path::new(identifier);
    path.is_absolute() || path.has_root()
}

/// Coerce an opaque location input into a [`BaseLocation`].
///
/// Accepts a `BaseLocation`, or a `&str`/`String` naming one. Anything else
/// falls back to primary storage with a warning.
pub fn coerce_location(input: &dyn Any) -> BaseLocation {
    if let Some(location) = input.downcast_ref::<BaseLocation>() {
        return *location;
    }

    let name = input
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| input.downcast_ref::<String>().map(String::as_str));

    match name.and_then(BaseLocation::parse) {
        Some(location) => location,
        None => {
            tracing::warn!(
                "Location input is not a BaseLocation, acting as if it was primary storage"
            );
            BaseLocation::PrimaryStorage
        }
    }
}

/// Maps identifiers to storage paths
pub trait PathResolver: Send + Sync {
    /// Folder that holds the records of a location
    fn folder_path(&self, location: BaseLocation) -> PathBuf;

    /// Path of the record stored under `identifier`
    fn file_path(&self, identifier: &str, location: BaseLocation) -> PathBuf;

    /// Path of a directory named by `identifier`, without any file extension
    fn directory_path(&self, identifier: &str, location: BaseLocation) -> PathBuf {
        if identifier.is_empty() {
            return self.folder_path(location);
        }
        if is_concrete_path(identifier) || location == BaseLocation::CustomPath {
            return PathBuf::from(identifier);
        }
        self.folder_path(location).join(identifier)
    }

    /// [`PathResolver::folder_path`] for an untyped location input
    fn folder_path_for(&self, input: &dyn Any) -> PathBuf {
        self.folder_path(coerce_location(input))
    }

    /// [`PathResolver::file_path`] for an untyped location input
    fn file_path_for(&self, identifier: &str, input: &dyn Any) -> PathBuf {
        self.file_path(identifier, coerce_location(input))
    }
}

/// `<root>/<identifier>`, the engine default
#[derive(Debug, Clone)]
pub struct FlatPathResolver {
    roots: LocationRoots,
}

impl FlatPathResolver {
    pub fn new(roots: LocationRoots) -> Self {
        Self { roots }
    }
}

impl PathResolver for FlatPathResolver {
    fn folder_path(&self, location: BaseLocation) -> PathBuf {
        self.roots.root(location).to_path_buf()
    }

    fn file_path(&self, identifier: &str, location: BaseLocation) -> PathBuf {
        if is_concrete_path(identifier) || location == BaseLocation::CustomPath {
            return PathBuf::from(identifier);
        }
        self.folder_path(location).join(identifier)
    }
}

/// `<root>/<relative_path>/<identifier>.<extension>`
///
/// The relative path and extension are normalized on construction: trimmed,
/// stripped of leading and trailing separators (and dots, for the extension).
/// A value that ends up empty reverts to the default with a warning.
#[derive(Debug, Clone)]
pub struct StructuredPathResolver {
    roots: LocationRoots,
    relative_path: String,
    file_extension: String,
}

impl StructuredPathResolver {
    pub fn new(roots: LocationRoots, relative_path: &str, file_extension: &str) -> Self {
        Self {
            roots,
            relative_path: normalize_relative_path(relative_path),
            file_extension: normalize_extension(file_extension),
        }
    }

    pub fn with_defaults(roots: LocationRoots) -> Self {
        Self::new(roots, DEFAULT_RELATIVE_PATH, DEFAULT_FILE_EXTENSION)
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }
}

impl PathResolver for StructuredPathResolver {
    fn folder_path(&self, location: BaseLocation) -> PathBuf {
        self.roots.root(location).join(&self.relative_path)
    }

    fn file_path(&self, identifier: &str, location: BaseLocation) -> PathBuf {
        if is_concrete_path(identifier) || location == BaseLocation::CustomPath {
            return PathBuf::from(identifier);
        }
        self.folder_path(location)
            .join(format!("{identifier}.{}", self.file_extension))
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn normalize_relative_path(input: &str) -> String {
    let trimmed = input.trim().trim_matches(is_separator);
    if trimmed.is_empty() {
        tracing::warn!(
            "Relative path '{input}' is empty after trimming, reverting to the default: {DEFAULT_RELATIVE_PATH}"
        );
        return DEFAULT_RELATIVE_PATH.to_string();
    }
    trimmed.to_string()
}

fn normalize_extension(input: &str) -> String {
    let trimmed = input
        .trim()
        .trim_matches(|c: char| c == '.' || is_separator(c));
    if trimmed.is_empty() {
        tracing::warn!(
            "File extension '{input}' is empty after trimming, reverting to the default: {DEFAULT_FILE_EXTENSION}"
        );
        return DEFAULT_FILE_EXTENSION.to_string();
    }
    trimmed.to_string()
}
