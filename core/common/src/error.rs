//! Common error types for PassVault.

use thiserror::Error;

/// Top-level error type for PassVault operations.
///
/// Messages never carry key material, digests, tokens or plaintext.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic primitive failed for a reason other than bad input.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Digest does not carry enough key material for the cipher.
    #[error("Invalid digest length: expected at least {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    /// Digest could not be parsed.
    #[error("Malformed digest: {0}")]
    MalformedDigest(String),

    /// Record was produced under another key, truncated or tampered with.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Token signature, format or claims are invalid.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token signature is valid but its expiry has passed.
    #[error("Token expired")]
    TokenExpired,

    /// Unknown user or wrong master password.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Credential store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// State changed underneath the operation; retrying may succeed.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Message safe to hand back to an end user.
    ///
    /// Collapses every authentication-related failure into the same text so
    /// callers cannot tell a bad token from an unknown user.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::AuthenticationFailed | Error::InvalidToken(_) | Error::TokenExpired => {
                "invalid credentials"
            }
            Error::NotFound(_) => "not found",
            Error::AlreadyExists(_) => "already exists",
            Error::Conflict(_) => "conflict, try again",
            Error::InvalidInput(_) => "invalid request",
            _ => "internal error",
        }
    }

    /// Whether the failure was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed
                | Error::InvalidToken(_)
                | Error::TokenExpired
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::InvalidInput(_)
                | Error::Conflict(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
