/*!
Ciphers applied to serialized payloads before they reach storage.

The default [`SimpleCipher`] is obfuscation: it keeps casual readers out of a
save file and reliably rejects a wrong password, but it is not a secure
construction. Callers that need confidentiality should use [`AesGcmCipher`]
(feature `aes`) or supply their own [`Cipher`].
*/

use crate::config::ApplicationIdentity;
use crate::{Result, SaveError};
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const SALT_SIZE: usize = 16;
const TAG_SIZE: usize = 16;

/// Machine identity, looked up once per process
static MACHINE_ID: Lazy<String> = Lazy::new(|| {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_else(|| "unknown-device".to_string())
});

/// Reversible text transform keyed by a password
#[cfg_attr(test, mockall::automock)]
pub trait Cipher: Send + Sync {
    /// Encode plaintext into ciphertext text
    fn encode(&self, plaintext: &str, password: &str) -> Result<String>;

    /// Decode ciphertext text back into plaintext
    ///
    /// # Errors
    /// `SaveError::DecodeFailed` when the password is wrong or the ciphertext
    /// is corrupt; never returns garbled plaintext.
    fn decode(&self, ciphertext: &str, password: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Derive the default password for an application on this machine.
///
/// Stable across runs of the same installation. Not a secret: anyone with
/// access to the machine can derive it, so set your own password in
/// production.
pub fn default_password(application: &ApplicationIdentity) -> String {
    let mut hasher = Sha256::new();
    hasher.update(MACHINE_ID.as_bytes());
    hasher.update(application.bundle_id().as_bytes());
    let digest = hasher.finalize();
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("SK_{prefix:08X}")
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn decode_base64(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| SaveError::decode_failed(format!("Ciphertext is not valid base64: {e}")))
}

/// Best-effort password cipher
///
/// Output is base64 of `salt | check tag | body`, where the body is the
/// plaintext XORed with a SHA-256 keystream and the tag lets `decode` reject
/// a wrong password.
#[derive(Debug, Clone, Default)]
pub struct SimpleCipher;

impl SimpleCipher {
    pub fn new() -> Self {
        Self
    }

    fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(salt);
        hasher.finalize().into()
    }

    fn apply_keystream(key: &[u8; 32], data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(key);
            hasher.update((counter as u64).to_le_bytes());
            let block = hasher.finalize();
            for (byte, pad) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= pad;
            }
        }
    }

    fn check_tag(key: &[u8; 32], plaintext: &[u8]) -> [u8; TAG_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(b"savekeep-check");
        hasher.update(key);
        hasher.update(plaintext);
        let digest = hasher.finalize();
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&digest[..TAG_SIZE]);
        tag
    }
}

impl Cipher for SimpleCipher {
    fn encode(&self, plaintext: &str, password: &str) -> Result<String> {
        let salt: [u8; SALT_SIZE] = random_bytes();
        let key = Self::derive_key(password, &salt);
        let tag = Self::check_tag(&key, plaintext.as_bytes());

        let mut body = plaintext.as_bytes().to_vec();
        Self::apply_keystream(&key, &mut body);

        let mut output = Vec::with_capacity(SALT_SIZE + TAG_SIZE + body.len());
        output.extend_from_slice(&salt);
        output.extend_from_slice(&tag);
        output.extend_from_slice(&body);

        Ok(base64::engine::general_purpose::STANDARD.encode(output))
    }

    fn decode(&self, ciphertext: &str, password: &str) -> Result<String> {
        let raw = decode_base64(ciphertext)?;
        if raw.len() < SALT_SIZE + TAG_SIZE {
            return Err(SaveError::decode_failed(format!(
                "Ciphertext too short: {} bytes",
                raw.len()
            )));
        }

        let (salt, rest) = raw.split_at(SALT_SIZE);
        let (tag, body) = rest.split_at(TAG_SIZE);
        let key = Self::derive_key(password, salt);

        let mut plaintext = body.to_vec();
        Self::apply_keystream(&key, &mut plaintext);

        if Self::check_tag(&key, &plaintext)[..] != tag[..] {
            return Err(SaveError::decode_failed("Wrong password or corrupted data"));
        }

        String::from_utf8(plaintext)
            .map_err(|e| SaveError::decode_failed(format!("Decoded text is not UTF-8: {e}")))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

#[cfg(feature = "aes")]
mod aes {
    use super::{decode_base64, random_bytes, Cipher, SALT_SIZE};
    use crate::{Result, SaveError};
    use aes_gcm::{
        aead::{Aead, KeyInit},
        Aes256Gcm, Key, Nonce,
    };
    use base64::Engine;
    use sha2::{Digest, Sha256};

    /// Magic bytes identifying this format
    pub const MAGIC_HEADER: &[u8] = b"SKAES1";

    const NONCE_SIZE: usize = 12;

    /// Auth tag appended by AES-GCM
    const AUTH_TAG_SIZE: usize = 16;

    fn encryption_error(e: aes_gcm::Error) -> SaveError {
        SaveError::encoding(format!("AES-256-GCM encryption failed: {e}"))
    }

    /// AES-256-GCM cipher with a password-derived key
    ///
    /// Output is base64 of `magic | salt | nonce | ciphertext+tag`. The key is
    /// SHA-256 iterated over password and salt.
    #[derive(Debug, Clone)]
    pub struct AesGcmCipher {
        rounds: u32,
    }

    impl AesGcmCipher {
        pub const DEFAULT_ROUNDS: u32 = 10_000;

        pub fn new() -> Self {
            Self {
                rounds: Self::DEFAULT_ROUNDS,
            }
        }

        /// Use a specific number of key-derivation rounds (minimum 1)
        pub fn with_rounds(rounds: u32) -> Self {
            Self {
                rounds: rounds.max(1),
            }
        }

        fn derive_key(&self, password: &str, salt: &[u8]) -> [u8; 32] {
            let mut key: [u8; 32] = Sha256::new()
                .chain_update(salt)
                .chain_update(password.as_bytes())
                .finalize()
                .into();
            for _ in 1..self.rounds {
                key = Sha256::new()
                    .chain_update(key)
                    .chain_update(salt)
                    .finalize()
                    .into();
            }
            key
        }
    }

    impl Default for AesGcmCipher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Cipher for AesGcmCipher {
        fn encode(&self, plaintext: &str, password: &str) -> Result<String> {
            let salt: [u8; SALT_SIZE] = random_bytes();
            let nonce_bytes: [u8; NONCE_SIZE] = random_bytes();
            let key_bytes = self.derive_key(password, &salt);

            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
                .map_err(encryption_error)?;

            let mut output = Vec::with_capacity(
                MAGIC_HEADER.len() + SALT_SIZE + NONCE_SIZE + ciphertext.len(),
            );
            output.extend_from_slice(MAGIC_HEADER);
            output.extend_from_slice(&salt);
            output.extend_from_slice(&nonce_bytes);
            output.extend_from_slice(&ciphertext);

            tracing::debug!(
                plaintext_len = plaintext.len(),
                encrypted_len = output.len(),
                "Encrypted payload"
            );

            Ok(base64::engine::general_purpose::STANDARD.encode(output))
        }

        fn decode(&self, ciphertext: &str, password: &str) -> Result<String> {
            let raw = decode_base64(ciphertext)?;
            let min_size = MAGIC_HEADER.len() + SALT_SIZE + NONCE_SIZE + AUTH_TAG_SIZE;
            if raw.len() < min_size {
                return Err(SaveError::decode_failed(format!(
                    "Encrypted data too short: {} bytes, minimum {min_size}",
                    raw.len()
                )));
            }
            if !raw.starts_with(MAGIC_HEADER) {
                return Err(SaveError::decode_failed(
                    "Invalid encrypted payload: missing magic header",
                ));
            }

            let salt_start = MAGIC_HEADER.len();
            let nonce_start = salt_start + SALT_SIZE;
            let body_start = nonce_start + NONCE_SIZE;
            let key_bytes = self.derive_key(password, &raw[salt_start..nonce_start]);

            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
            let plaintext = cipher
                .decrypt(
                    Nonce::from_slice(&raw[nonce_start..body_start]),
                    &raw[body_start..],
                )
                .map_err(|e| {
                    SaveError::decode_failed(format!(
                        "AES-256-GCM decryption failed (wrong password or corrupted data): {e}"
                    ))
                })?;

            String::from_utf8(plaintext)
                .map_err(|e| SaveError::decode_failed(format!("Decrypted text is not UTF-8: {e}")))
        }

        fn name(&self) -> &'static str {
            "aes-gcm"
        }
    }

}

#[cfg(feature = "aes")]
pub use aes::AesGcmCipher;

/// Look up a built-in cipher by name (`simple`, `aes`)
pub fn cipher_by_name(name: &str) -> Option<Arc<dyn Cipher>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "simple" => Some(Arc::new(SimpleCipher::new())),
        #[cfg(feature = "aes")]
        "aes" | "aes-gcm" => Some(Arc::new(AesGcmCipher::new())),
        _ => None,
    }
}
