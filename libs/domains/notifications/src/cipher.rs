//! Phone number encryption at rest.
//!
//! Ciphertext layout: `base64(nonce[12] || aes-256-gcm(ciphertext || tag))`.
//! Without a key the cipher degrades to a pass-through and stores plaintext.
//!
//! Because every encryption uses a fresh nonce, ciphertexts cannot be
//! compared. Lookups go through [`PhoneCipher::lookup_key`], a keyed
//! HMAC-SHA256 blind index of the normalized number.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::error::NotificationError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption key must be 32 bytes (base64 or hex), got {0}")]
    InvalidKey(String),
    #[error("value is encrypted but no encryption key is configured")]
    KeyMissing,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed: {0}")]
    DecryptFailed(String),
}

impl From<CipherError> for NotificationError {
    fn from(err: CipherError) -> Self {
        NotificationError::CipherError(err.to_string())
    }
}

/// Key material for [`PhoneCipher`].
#[derive(Clone, Default)]
pub struct CipherConfig {
    /// Base64 or 64-character hex encoding of a 32-byte key.
    pub key: Option<String>,
}

impl std::fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct PhoneCipher {
    keys: Option<Keys>,
}

#[derive(Clone)]
struct Keys {
    aead: Aes256Gcm,
    lookup: [u8; KEY_LEN],
}

impl PhoneCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let mut digest = Sha256::new();
        digest.update(b"phone-lookup:");
        digest.update(key);
        let mut lookup = [0u8; KEY_LEN];
        lookup.copy_from_slice(&digest.finalize());

        Self {
            keys: Some(Keys {
                aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
                lookup,
            }),
        }
    }

    /// Pass-through cipher. Phones are stored in plaintext.
    pub fn disabled() -> Self {
        Self { keys: None }
    }

    pub fn from_config(config: &CipherConfig) -> Result<Self, CipherError> {
        match config.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(encoded) => Ok(Self::new(decode_key(encoded)?)),
            None => {
                warn!("No phone encryption key configured; phone numbers will be stored in plaintext");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.keys.is_some()
    }

    pub fn encrypt(&self, phone: &str) -> Result<String, CipherError> {
        let Some(keys) = &self.keys else {
            return Ok(phone.to_string());
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = keys
            .aead
            .encrypt(&nonce, phone.as_bytes())
            .map_err(|_| CipherError::EncryptFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Strict decryption of a value produced by [`PhoneCipher::encrypt`].
    pub fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let keys = self.keys.as_ref().ok_or(CipherError::KeyMissing)?;

        let combined = STANDARD
            .decode(stored.trim())
            .map_err(|e| CipherError::DecryptFailed(e.to_string()))?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::DecryptFailed("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = keys
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::DecryptFailed("authentication failed".into()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::DecryptFailed(e.to_string()))
    }

    /// Decrypt a stored value that may predate encryption.
    ///
    /// Values that look like a plaintext phone number are returned as-is.
    pub fn decrypt_safe(&self, stored: &str) -> Result<String, CipherError> {
        if !looks_encrypted(stored) {
            return Ok(stored.to_string());
        }
        self.decrypt(stored)
    }

    /// Deterministic blind index for equality lookups on a normalized phone.
    ///
    /// HMAC-SHA256 under the derived lookup key, or plain SHA-256 without a
    /// key. Adding or rotating the key changes every index value; run
    /// [`OptOutRegistry::reindex_lookups`](crate::opt_out::OptOutRegistry::reindex_lookups)
    /// afterwards so existing opt-outs keep matching.
    pub fn lookup_key(&self, normalized_phone: &str) -> String {
        match &self.keys {
            Some(keys) => match <HmacSha256 as Mac>::new_from_slice(&keys.lookup) {
                Ok(mut mac) => {
                    mac.update(normalized_phone.as_bytes());
                    hex::encode(mac.finalize().into_bytes())
                }
                Err(_) => hex::encode(Sha256::digest(normalized_phone.as_bytes())),
            },
            None => hex::encode(Sha256::digest(normalized_phone.as_bytes())),
        }
    }
}

impl std::fmt::Debug for PhoneCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoneCipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Heuristic: is this our base64 ciphertext rather than a legacy plaintext phone?
pub fn looks_encrypted(value: &str) -> bool {
    let value = value.trim();
    let phone_like = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    if phone_like {
        return false;
    }
    STANDARD
        .decode(value)
        .map(|bytes| bytes.len() > NONCE_LEN + TAG_LEN)
        .unwrap_or(false)
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], CipherError> {
    let bytes = if encoded.len() == KEY_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(encoded).map_err(|e| CipherError::InvalidKey(e.to_string()))?
    } else {
        STANDARD
            .decode(encoded)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?
    };

    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CipherError::InvalidKey(format!("{} bytes", b.len())))
}
