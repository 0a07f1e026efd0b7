//! Key types with secure memory handling.
//!
//! All secret key types automatically zeroize their memory on drop and
//! redact themselves in `Debug` output.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use passvault_common::{Error, Result};

/// Length of record encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Minimum length of the token signing secret in bytes.
pub const MIN_SIGNING_SECRET_LENGTH: usize = 32;

/// Length of the key pepper in bytes.
pub const PEPPER_LENGTH: usize = 32;

/// Stored, irreversible representation of a master password.
///
/// Holds an Argon2id PHC string (`$argon2id$v=19$m=...$<salt>$<hash>`),
/// so the salt and cost parameters travel with the digest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterSecretDigest(String);

impl MasterSecretDigest {
    /// Wrap a digest string loaded from storage.
    ///
    /// No validation happens here; malformed digests are rejected by the
    /// functions that consume them.
    pub fn from_string(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for MasterSecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecretDigest([REDACTED])")
    }
}

/// Symmetric key used to encrypt a user's stored passwords.
///
/// Derived on demand from the user's digest and never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Create a derived key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED])")
    }
}

/// Process-wide secret used to sign auth tokens.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// Create a signing secret from raw bytes.
    ///
    /// # Errors
    /// - Returns error if shorter than MIN_SIGNING_SECRET_LENGTH
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_SIGNING_SECRET_LENGTH {
            let len = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(Error::InvalidInput(format!(
                "Signing secret too short: expected at least {} bytes, got {}",
                MIN_SIGNING_SECRET_LENGTH, len
            )));
        }
        Ok(Self(bytes))
    }

    /// Decode a URL-safe base64 signing secret.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| Error::InvalidInput("Signing secret is not valid base64".to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Generate a random signing secret.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SIGNING_SECRET_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as URL-safe base64 for handing to an operator.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret([REDACTED; {} bytes])", self.0.len())
    }
}

/// Process-wide secret mixed into every record key derivation.
///
/// Without it, a stolen digest column alone does not yield record keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPepper([u8; PEPPER_LENGTH]);

impl KeyPepper {
    pub fn from_bytes(bytes: [u8; PEPPER_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decode a URL-safe base64 pepper.
    ///
    /// # Errors
    /// - Returns error if the decoded value is not exactly PEPPER_LENGTH bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| Error::InvalidInput("Key pepper is not valid base64".to_string()))?;

        if bytes.len() != PEPPER_LENGTH {
            let len = bytes.len();
            bytes.zeroize();
            return Err(Error::InvalidInput(format!(
                "Key pepper must be {} bytes, got {}",
                PEPPER_LENGTH, len
            )));
        }

        let mut pepper = [0u8; PEPPER_LENGTH];
        pepper.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(pepper))
    }

    /// Generate a random pepper.
    pub fn generate() -> Self {
        let mut pepper = [0u8; PEPPER_LENGTH];
        OsRng.fill_bytes(&mut pepper);
        Self(pepper)
    }

    pub fn as_bytes(&self) -> &[u8; PEPPER_LENGTH] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl fmt::Debug for KeyPepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPepper([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_key_equality() {
        let a = DerivedKey::from_bytes([7u8; KEY_LENGTH]);
        let b = DerivedKey::from_bytes([7u8; KEY_LENGTH]);
        let c = DerivedKey::from_bytes([8u8; KEY_LENGTH]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let key = DerivedKey::from_bytes([0xAB; KEY_LENGTH]);
        let digest = MasterSecretDigest::from_string("$argon2id$v=19$secret");
        let secret = SigningSecret::generate();

        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
        assert!(!format!("{:?}", digest).contains("argon2id"));
        assert!(!format!("{:?}", secret).contains(&secret.to_base64()));
    }

    #[test]
    fn test_signing_secret_too_short() {
        assert!(SigningSecret::from_bytes(vec![1u8; 16]).is_err());
        assert!(SigningSecret::from_bytes(vec![1u8; 32]).is_ok());
        assert!(SigningSecret::from_bytes(vec![1u8; 64]).is_ok());
    }

    #[test]
    fn test_signing_secret_base64_roundtrip() {
        let secret = SigningSecret::generate();
        let restored = SigningSecret::from_base64(&secret.to_base64()).unwrap();
        assert_eq!(secret.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn test_signing_secret_invalid_base64() {
        assert!(SigningSecret::from_base64("not base64 !!").is_err());
    }

    #[test]
    fn test_pepper_base64_roundtrip() {
        let pepper = KeyPepper::generate();
        let restored = KeyPepper::from_base64(&pepper.to_base64()).unwrap();
        assert_eq!(pepper.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn test_pepper_wrong_length() {
        let short = URL_SAFE_NO_PAD.encode([1u8; 16]);
        assert!(KeyPepper::from_base64(&short).is_err());
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(KeyPepper::generate().as_bytes(), KeyPepper::generate().as_bytes());
        assert_ne!(
            SigningSecret::generate().as_bytes(),
            SigningSecret::generate().as_bytes()
        );
    }

    #[test]
    fn test_digest_serializes_transparently() {
        let digest = MasterSecretDigest::from_string("$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, "\"$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA\"");
    }
}
