//! Value objects exchanged between the service and its store.
//!
//! Records are immutable; an update produces a new value that replaces the
//! stored one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use passvault_common::{RecordId, UserId};
use passvault_crypto::{EncryptedRecord, MasterSecretDigest};

/// A registered vault owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Argon2id digest of the master password.
    pub master_digest: MasterSecretDigest,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, master_digest: MasterSecretDigest) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into(),
            master_digest,
            created_at: Utc::now(),
        }
    }

    /// Same user with a replaced master digest.
    pub fn with_digest(&self, master_digest: MasterSecretDigest) -> Self {
        Self {
            master_digest,
            ..self.clone()
        }
    }
}

/// A stored website credential as persisted: the password is encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub website: String,
    pub username: String,
    pub encrypted_password: EncryptedRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PasswordRecord {
    pub fn new(
        user_id: UserId,
        website: impl Into<String>,
        username: impl Into<String>,
        encrypted_password: EncryptedRecord,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            user_id,
            website: website.into(),
            username: username.into(),
            encrypted_password,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply field changes, keeping everything not supplied.
    pub fn updated(
        &self,
        website: Option<String>,
        username: Option<String>,
        encrypted_password: Option<EncryptedRecord>,
    ) -> Self {
        Self {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            website: website.unwrap_or_else(|| self.website.clone()),
            username: username.unwrap_or_else(|| self.username.clone()),
            encrypted_password: encrypted_password
                .unwrap_or_else(|| self.encrypted_password.clone()),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Same record re-encrypted under another key.
    pub fn reencrypted(&self, encrypted_password: EncryptedRecord) -> Self {
        Self {
            encrypted_password,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Request to store a new credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewPassword {
    pub website: String,
    pub username: String,
    pub password: String,
}

impl NewPassword {
    pub fn new(
        website: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            website: website.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewPassword")
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PasswordUpdate {
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl PasswordUpdate {
    pub fn website(website: impl Into<String>) -> Self {
        Self {
            website: Some(website.into()),
            ..Self::default()
        }
    }

    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.website.is_none() && self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for PasswordUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordUpdate")
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A credential with its password decrypted, as returned to the owner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordView {
    pub id: RecordId,
    pub website: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PasswordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordView")
            .field("id", &self.id)
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
