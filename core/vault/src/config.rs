//! Service configuration and process-wide secrets.
//!
//! `VaultConfig` is plain data and may live in a JSON file. `Secrets` are
//! never serialized; they come from the environment or are generated.

use serde::{Deserialize, Serialize};
use std::path::Path;

use passvault_common::{Error, Result};
use passvault_crypto::{KdfParams, KeyPepper, SigningSecret, TokenSettings};

/// Environment variable holding the base64 token signing secret.
pub const SIGNING_SECRET_ENV: &str = "PASSVAULT_SIGNING_SECRET";

/// Environment variable holding the base64 record key pepper.
pub const KEY_PEPPER_ENV: &str = "PASSVAULT_KEY_PEPPER";

/// Tunable, non-secret service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Argon2id parameters for new master password digests.
    #[serde(default)]
    pub kdf_params: KdfParams,
    /// Token lifetime and issuer.
    #[serde(default)]
    pub token: TokenSettings,
}

impl VaultConfig {
    pub fn new(kdf_params: KdfParams, token: TokenSettings) -> Self {
        Self { kdf_params, token }
    }

    /// Check every section.
    ///
    /// # Errors
    /// - Returns `Config` error naming the first invalid section
    pub fn validate(&self) -> Result<()> {
        self.kdf_params
            .validate()
            .map_err(|e| Error::Config(format!("kdf_params: {}", e)))?;
        self.token
            .validate()
            .map_err(|e| Error::Config(format!("token: {}", e)))?;
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Process-wide secrets, read-only after startup.
#[derive(Debug, Clone)]
pub struct Secrets {
    signing_secret: SigningSecret,
    key_pepper: KeyPepper,
}

impl Secrets {
    pub fn new(signing_secret: SigningSecret, key_pepper: KeyPepper) -> Self {
        Self {
            signing_secret,
            key_pepper,
        }
    }

    /// Generate fresh secrets.
    ///
    /// Tokens and records produced under generated secrets become unusable
    /// once the process exits, so this is only suitable for tests and
    /// throwaway instances.
    pub fn generate() -> Self {
        Self::new(SigningSecret::generate(), KeyPepper::generate())
    }

    /// Read secrets from `PASSVAULT_SIGNING_SECRET` and `PASSVAULT_KEY_PEPPER`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read secrets through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let signing_secret = lookup(SIGNING_SECRET_ENV)
            .ok_or_else(|| Error::Config(format!("{} is not set", SIGNING_SECRET_ENV)))?;
        let signing_secret = SigningSecret::from_base64(&signing_secret)
            .map_err(|e| Error::Config(format!("{}: {}", SIGNING_SECRET_ENV, e)))?;

        let key_pepper = lookup(KEY_PEPPER_ENV)
            .ok_or_else(|| Error::Config(format!("{} is not set", KEY_PEPPER_ENV)))?;
        let key_pepper = KeyPepper::from_base64(&key_pepper)
            .map_err(|e| Error::Config(format!("{}: {}", KEY_PEPPER_ENV, e)))?;

        Ok(Self::new(signing_secret, key_pepper))
    }

    pub fn signing_secret(&self) -> &SigningSecret {
        &self.signing_secret
    }

    pub fn key_pepper(&self) -> &KeyPepper {
        &self.key_pepper
    }
}
