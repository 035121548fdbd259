/*!
# Savekeep Core Engine

Local persistence for application state: save a value under a string
identifier, load it back later.

This crate provides:

- A save/load engine with lifecycle hooks and a single error envelope
- Pluggable codecs (JSON, gzip-compressed JSON) and ciphers
- Flat and structured path conventions over primary, secondary and custom roots
- Filesystem and key-value storage backends

## Architecture

The engine is the only component that knows the order of the pipeline:
- Codecs, ciphers, path resolvers and storage backends are traits
- Each call resolves its options into an immutable snapshot
- Failures are wrapped once, at the engine boundary

## Usage

```rust
use savekeep_core::{SaveEngine, SaveOptions, SaveSettings};

let dir = tempfile::tempdir()?;
let engine = SaveEngine::new(SaveSettings::with_root(dir.path()))?;

let options = SaveOptions::new().with_encrypt(true).with_password("p1");
engine.save("x", &"data".to_string(), &options)?;

let wrong = SaveOptions::new().with_encrypt(true).with_password("p2");
let err = engine.load("x", String::new(), &wrong).unwrap_err();
assert!(err.is_decode_failure());

engine.delete("x", None)?;
assert!(!engine.exists("x", None)?);
# Ok::<(), savekeep_core::SaveError>(())
```
*/

pub mod cipher;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod options;
pub mod path;
pub mod storage;

#[cfg(test)]
mod engine_tests;

#[cfg(feature = "aes")]
pub use cipher::AesGcmCipher;
pub use cipher::{cipher_by_name, default_password, Cipher, SimpleCipher};
pub use codec::{codec_by_name, Codec, GzipJsonCodec, JsonCodec, TextEncoding};
pub use config::{ApplicationIdentity, BaseLocation, LocationRoots, PathConvention, SaveSettings};
pub use engine::{create_default_engine, create_engine_from_settings, SaveEngine};
pub use error::{Result, SaveError};
pub use lifecycle::{Lifecycle, LifecycleEvent, LifecycleStage};
pub use options::{ResolvedOptions, SaveOptions};
pub use path::{FlatPathResolver, PathResolver, StructuredPathResolver};
pub use storage::{
    IgnoreList, KeyValueStorage, KeyValueStore, LocalFileStorage, StorageBackend, StorageMode,
};
