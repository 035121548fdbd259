/*!
Error types for the Savekeep core engine.
*/

use thiserror::Error;

/// Result type used throughout the Savekeep core.
pub type Result<T> = std::result::Result<T, SaveError>;

/// Errors that can occur during save, load and storage operations.
#[derive(Error, Debug)]
pub enum SaveError {
    /// Identifier was empty; raised before any I/O happens
    #[error("Invalid identifier: identifier must not be empty")]
    InvalidIdentifier,

    /// Any failure inside the save pipeline, wrapped once at the engine boundary
    #[error("Failed to save data with identifier '{identifier}': {source}")]
    SaveFailed {
        identifier: String,
        source: Box<SaveError>,
    },

    /// Any failure inside the load pipeline, wrapped once at the engine boundary
    #[error("Failed to load data with identifier '{identifier}': {source}")]
    LoadFailed {
        identifier: String,
        source: Box<SaveError>,
    },

    /// Ciphertext could not be decoded (wrong password or corrupt data)
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Text encoding errors
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Background task failures
    #[error("Task error: {0}")]
    Task(String),
}

impl SaveError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new decode error
    pub fn decode_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecodeFailed(msg.into())
    }

    /// Create a new text encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    /// Wrap a pipeline failure for the given identifier
    pub fn save_failed(identifier: &str, source: SaveError) -> Self {
        Self::SaveFailed {
            identifier: identifier.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap a pipeline failure for the given identifier
    pub fn load_failed(identifier: &str, source: SaveError) -> Self {
        Self::LoadFailed {
            identifier: identifier.to_string(),
            source: Box::new(source),
        }
    }

    /// True if this error, or any error it wraps, is a decode failure.
    ///
    /// Use this to detect a wrong password through the `LoadFailed` envelope.
    pub fn is_decode_failure(&self) -> bool {
        match self {
            Self::DecodeFailed(_) => true,
            Self::SaveFailed { source, .. } | Self::LoadFailed { source, .. } => {
                source.is_decode_failure()
            }
            _ => false,
        }
    }

    /// The identifier carried by a wrapped failure, if any
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::SaveFailed { identifier, .. } | Self::LoadFailed { identifier, .. } => {
                Some(identifier)
            }
            _ => None,
        }
    }
}
