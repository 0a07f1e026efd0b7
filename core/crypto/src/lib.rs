//! Cryptographic core for PassVault.
//!
//! This module provides:
//! - Master password digests using Argon2id
//! - Record key derivation from a digest using BLAKE2b
//! - Authenticated encryption of stored passwords using XChaCha20-Poly1305
//! - Signed, expiring auth tokens
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons
//!
//! Every function here is pure and synchronous; none of them touch
//! storage or the network.

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod token;

pub use aead::{decrypt, encrypt, EncryptedRecord};
pub use kdf::{compute_digest, derive_key, verify, KdfParams};
pub use keys::{DerivedKey, KeyPepper, MasterSecretDigest, SigningSecret, KEY_LENGTH};
pub use token::{AuthToken, TokenClaims, TokenSettings, TokenSigner};
