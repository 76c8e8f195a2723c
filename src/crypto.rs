//! Chunk payload encryption
//!
//! AES-256-GCM with a fresh random 96-bit nonce per payload. The sealed blob
//! layout is `nonce (12) || tag (16) || ciphertext`, so a blob is always
//! exactly [`OVERHEAD`] bytes longer than its plaintext.

use std::fmt;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{Result, StoreError};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Bytes added to every payload by [`encrypt`]
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Process-wide symmetric key
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new key from the operating system RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 64 hex characters
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|e| StoreError::InvalidInput(format!("encryption key is not hex: {}", e)))?;
        let bytes: [u8; KEY_SIZE] = decoded.try_into().map_err(|v: Vec<u8>| {
            StoreError::InvalidInput(format!(
                "encryption key must be {} bytes, got {}",
                KEY_SIZE,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Seal `plaintext` into a `nonce || tag || ciphertext` blob
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut blob = Vec::with_capacity(OVERHEAD + plaintext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&[0u8; TAG_SIZE]);
    blob.extend_from_slice(plaintext);

    let tag = key
        .cipher()
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut blob[OVERHEAD..])
        .map_err(|_| StoreError::InvalidInput("payload too large to encrypt".to_string()))?;
    blob[NONCE_SIZE..OVERHEAD].copy_from_slice(&tag);

    Ok(blob)
}

/// Open a blob produced by [`encrypt`]
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < OVERHEAD {
        return Err(StoreError::Authentication(format!(
            "payload of {} bytes is shorter than the {} byte header",
            blob.len(),
            OVERHEAD
        )));
    }

    let (nonce, rest) = blob.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let mut plaintext = ciphertext.to_vec();
    key.cipher()
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut plaintext,
            Tag::from_slice(tag),
        )
        .map_err(|_| StoreError::Authentication("tag mismatch".to_string()))?;

    Ok(plaintext)
}
