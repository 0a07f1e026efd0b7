//! Authenticated encryption of stored passwords using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.
//!
//! An encrypted record is `version || nonce || ciphertext || tag`,
//! URL-safe base64 without padding. The version byte is also bound as
//! associated data.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::keys::DerivedKey;
use passvault_common::{Error, Result};

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

const HEADER_SIZE: usize = 1 + NONCE_SIZE;

/// Opaque, text-safe ciphertext of a single stored password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRecord(String);

impl EncryptedRecord {
    /// Wrap a record loaded from storage.
    pub fn from_string(record: impl Into<String>) -> Self {
        Self(record.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EncryptedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encrypt a secret under a derived key.
///
/// # Postconditions
/// - The nonce is randomly generated, so encrypting the same plaintext
///   twice yields different records
/// - The record decodes to HEADER_SIZE + plaintext length + TAG_SIZE bytes
///
/// # Errors
/// - Returns error if encryption fails
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<EncryptedRecord> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: &[RECORD_VERSION],
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut record = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    record.push(RECORD_VERSION);
    record.extend_from_slice(&nonce);
    record.extend_from_slice(&ciphertext);

    Ok(EncryptedRecord(URL_SAFE_NO_PAD.encode(record)))
}

/// Decrypt a record under a derived key.
///
/// # Errors
/// - `DecryptionFailed` if the record is not valid base64, is truncated,
///   carries an unknown version, fails authentication (wrong key or
///   tampered data) or does not decrypt to UTF-8
///
/// # Security
/// - Authenticates before returning any plaintext
pub fn decrypt(record: &EncryptedRecord, key: &DerivedKey) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(record.as_str())
        .map_err(|_| Error::DecryptionFailed)?;

    if bytes.len() < HEADER_SIZE + TAG_SIZE {
        return Err(Error::DecryptionFailed);
    }

    let (version, rest) = bytes.split_at(1);
    if version[0] != RECORD_VERSION {
        return Err(Error::DecryptionFailed);
    }

    let (nonce_bytes, encrypted) = rest.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    let plaintext = cipher
        .decrypt(
            GenericArray::from_slice(nonce_bytes),
            Payload {
                msg: encrypted,
                aad: &[RECORD_VERSION],
            },
        )
        .map_err(|_| Error::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|e| {
        e.into_bytes().zeroize();
        Error::DecryptionFailed
    })
}
