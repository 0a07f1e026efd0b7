//! Master password digests and record key derivation.
//!
//! Digests are Argon2id PHC strings with a fresh random salt per user.
//! Record keys are derived from a digest with BLAKE2b, mixed with a
//! process-wide pepper so the stored digest alone never yields a key.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version, ARGON2ID_IDENT,
};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::keys::{DerivedKey, KeyPepper, MasterSecretDigest, KEY_LENGTH};
use passvault_common::{Error, Result};

/// Domain separation label for record encryption keys.
const RECORD_KEY_CONTEXT: &[u8] = b"passvault.record-key.v1";

/// Parameters for Argon2id digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
    /// Length of the hash output in bytes.
    #[serde(default = "default_output_len")]
    pub output_len: usize,
}

fn default_output_len() -> usize {
    KEY_LENGTH
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_len: KEY_LENGTH,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
            output_len: KEY_LENGTH,
        }
    }

    /// Create moderate parameters for constrained hosts.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
            output_len: KEY_LENGTH,
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            other => Err(Error::InvalidInput(format!(
                "Unknown KDF preset '{}'; use interactive, moderate or sensitive",
                other
            ))),
        }
    }

    /// Check the parameters against Argon2's limits.
    ///
    /// The hash output must be at least KEY_LENGTH bytes, since record
    /// keys are derived from it. Costs may not exceed the `sensitive`
    /// preset, which is the most `verify` will evaluate.
    pub fn validate(&self) -> Result<()> {
        if self.output_len < KEY_LENGTH {
            return Err(Error::InvalidInput(format!(
                "KDF output length must be at least {} bytes, got {}",
                KEY_LENGTH, self.output_len
            )));
        }
        let params = self.to_argon2()?;
        if !within_cost_limit(&params) {
            return Err(Error::InvalidInput(
                "KDF cost exceeds the sensitive preset".to_string(),
            ));
        }
        Ok(())
    }

    fn to_argon2(&self) -> Result<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Compute the stored digest of a master password.
///
/// # Preconditions
/// - `master_password` must not be empty
///
/// # Postconditions
/// - Returns an Argon2id PHC string with a freshly generated salt
/// - Two calls with the same password return different digests
///
/// # Errors
/// - Returns error if password is empty
/// - Returns error if Argon2id parameters are invalid
pub fn compute_digest(master_password: &str, params: &KdfParams) -> Result<MasterSecretDigest> {
    if master_password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    params.validate()?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(master_password.as_bytes(), &salt)
        .map_err(|e| Error::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(MasterSecretDigest::from_string(hash.to_string()))
}

/// Check a master password against a stored digest.
///
/// Recomputes the hash with the salt and parameters embedded in the
/// digest; the hash outputs are compared in constant time. Malformed
/// digests, digests of any algorithm other than Argon2id and digests whose
/// cost exceeds the `sensitive` preset return false without hashing.
pub fn verify(master_password: &str, digest: &MasterSecretDigest) -> bool {
    let parsed = match PasswordHash::new(digest.as_str()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if parsed.algorithm != ARGON2ID_IDENT {
        return false;
    }
    match Params::try_from(&parsed) {
        Ok(params) if within_cost_limit(&params) => {}
        _ => return false,
    }

    Argon2::default()
        .verify_password(master_password.as_bytes(), &parsed)
        .is_ok()
}

fn within_cost_limit(params: &Params) -> bool {
    let limit = KdfParams::sensitive();
    params.m_cost() <= limit.memory_cost
        && params.t_cost() <= limit.time_cost
        && params.p_cost() <= limit.parallelism
}

/// Derive the record encryption key for a digest.
///
/// # Postconditions
/// - Returns a KEY_LENGTH key, deterministic in (digest, pepper)
/// - The key differs from every byte string stored in the digest
///
/// # Errors
/// - `MalformedDigest` if the digest is not a PHC string with salt and hash
/// - `InvalidDigestLength` if the hash output is shorter than KEY_LENGTH
pub fn derive_key(digest: &MasterSecretDigest, pepper: &KeyPepper) -> Result<DerivedKey> {
    let parsed = PasswordHash::new(digest.as_str())
        .map_err(|e| Error::MalformedDigest(e.to_string()))?;

    let salt = parsed
        .salt
        .ok_or_else(|| Error::MalformedDigest("missing salt".to_string()))?;
    let hash = parsed
        .hash
        .ok_or_else(|| Error::MalformedDigest("missing hash output".to_string()))?;

    if hash.len() < KEY_LENGTH {
        return Err(Error::InvalidDigestLength {
            expected: KEY_LENGTH,
            actual: hash.len(),
        });
    }

    let salt = salt.as_str().as_bytes();

    let mut hasher = Blake2b::<U32>::new();
    hasher.update(RECORD_KEY_CONTEXT);
    hasher.update(pepper.as_bytes());
    hasher.update((salt.len() as u64).to_le_bytes());
    hasher.update(salt);
    hasher.update(hash.as_bytes());

    let result = hasher.finalize();
    let mut derived = [0u8; KEY_LENGTH];
    derived.copy_from_slice(&result);
    Ok(DerivedKey::from_bytes(derived))
}
