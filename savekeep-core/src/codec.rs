/*!
Codecs turning in-memory values into stored payloads and back.

A codec works on `serde_json::Value`, which keeps the trait object-safe so an
engine can hold a default codec and callers can swap one in per call. Typed
values cross into and out of that representation through [`to_payload`] and
[`from_payload`], which is also where absent values get their zero-value.
*/

use crate::{Result, SaveError};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;

/// Text encoding used when a codec turns text into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
}

impl TextEncoding {
    /// Encode text into bytes
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    /// Decode bytes into text, dropping a leading byte-order mark
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let text = match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| SaveError::encoding(format!("Invalid UTF-8 payload: {e}")))?,
            Self::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(SaveError::encoding(format!(
                        "UTF-16 payload has odd length {}",
                        bytes.len()
                    )));
                }
                let units = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .collect::<std::result::Result<String, _>>()
                    .map_err(|e| SaveError::encoding(format!("Invalid UTF-16 payload: {e}")))?
            }
        };

        Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
        }
    }
}

/// Serialization abstraction for stored values
///
/// Implementations write a value to a sink and read it back. `deserialize`
/// returns `Ok(None)` when the payload is empty or decodes to nothing, and an
/// error only when the bytes themselves cannot be decoded.
pub trait Codec: Send + Sync {
    /// Serialize a value into the sink
    ///
    /// # Arguments
    /// * `value` - The value to write
    /// * `sink` - Destination stream
    /// * `encoding` - Text encoding for textual formats
    fn serialize(&self, value: &Value, sink: &mut dyn Write, encoding: TextEncoding)
        -> Result<()>;

    /// Deserialize a value from the source
    ///
    /// # Returns
    /// The decoded value, `None` for an empty or null payload, or an error if
    /// the payload is malformed
    fn deserialize(&self, source: &mut dyn Read, encoding: TextEncoding)
        -> Result<Option<Value>>;

    /// Get the name of the format
    fn name(&self) -> &str;
}

/// Convert a typed value into a codec payload
///
/// An absent value is replaced with the type's zero-value.
pub fn to_payload<T>(value: Option<&T>) -> Result<Value>
where
    T: Serialize + Default,
{
    match value {
        Some(value) => Ok(serde_json::to_value(value)?),
        None => Ok(serde_json::to_value(T::default())?),
    }
}

/// Convert a codec payload back into a typed value
///
/// Returns `None` for an absent or null payload, and for a payload whose
/// shape does not match `T`; the mismatch is logged.
pub fn from_payload<T>(payload: Option<Value>) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = payload?;
    if value.is_null() {
        return None;
    }

    match serde_json::from_value(value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            tracing::warn!(
                "Stored payload does not match {}: {e}",
                std::any::type_name::<T>()
            );
            None
        }
    }
}

/// JSON codec
///
/// Compact output by default; [`JsonCodec::pretty`] writes indented JSON.
///
/// # Example
/// ```rust
/// use savekeep_core::{Codec, JsonCodec, TextEncoding};
///
/// let codec = JsonCodec::new();
/// let mut buffer = Vec::new();
/// codec.serialize(&serde_json::json!({"score": 42}), &mut buffer, TextEncoding::Utf8)?;
/// assert_eq!(buffer, br#"{"score":42}"#);
/// # Ok::<(), savekeep_core::SaveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn serialize(
        &self,
        value: &Value,
        sink: &mut dyn Write,
        encoding: TextEncoding,
    ) -> Result<()> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        sink.write_all(&encoding.encode(&text))?;
        sink.flush()?;
        Ok(())
    }

    fn deserialize(
        &self,
        source: &mut dyn Read,
        encoding: TextEncoding,
    ) -> Result<Option<Value>> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let text = encoding.decode(&bytes)?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&text)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn name(&self) -> &str {
        if self.pretty {
            "json-pretty"
        } else {
            "json"
        }
    }
}

/// Gzip-compressed JSON codec
///
/// Produces binary payloads; in key-value mode, where records are text,
/// only use it together with encryption.
#[derive(Debug, Clone)]
pub struct GzipJsonCodec {
    compression_level: Compression,
    inner: JsonCodec,
}

impl GzipJsonCodec {
    /// Create a new gzip codec with default compression level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
            inner: JsonCodec::new(),
        }
    }

    /// Create a new gzip codec with the specified compression level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
            inner: JsonCodec::new(),
        }
    }

    pub fn fast() -> Self {
        Self::with_level(1)
    }

    pub fn max() -> Self {
        Self::with_level(9)
    }
}

impl Default for GzipJsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipJsonCodec {
    fn serialize(
        &self,
        value: &Value,
        sink: &mut dyn Write,
        encoding: TextEncoding,
    ) -> Result<()> {
        let mut encoder = GzEncoder::new(sink, self.compression_level);
        self.inner.serialize(value, &mut encoder, encoding)?;
        encoder
            .finish()
            .map_err(|e| SaveError::compression(format!("Failed to finish compression: {e}")))?;
        Ok(())
    }

    fn deserialize(
        &self,
        source: &mut dyn Read,
        encoding: TextEncoding,
    ) -> Result<Option<Value>> {
        let mut compressed = Vec::new();
        source.read_to_end(&mut compressed)?;
        if compressed.is_empty() {
            return Ok(None);
        }

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| SaveError::compression(format!("Failed to decompress data: {e}")))?;

        let mut reader: &[u8] = &decompressed;
        self.inner.deserialize(&mut reader, encoding)
    }

    fn name(&self) -> &str {
        "gzip-json"
    }
}

/// Look up a built-in codec by name (`json`, `json-pretty`, `gzip`)
pub fn codec_by_name(name: &str) -> Option<Arc<dyn Codec>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "json" => Some(Arc::new(JsonCodec::new())),
        "json-pretty" | "pretty" => Some(Arc::new(JsonCodec::pretty())),
        "gzip" | "gzip-json" => Some(Arc::new(GzipJsonCodec::new())),
        _ => None,
    }
}
