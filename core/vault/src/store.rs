//! Credential store abstraction.
//!
//! The service never touches a database handle; it hands value objects to
//! a `CredentialStore` and gets value objects back.
//!
//! Record ciphertext is only valid under the key of the owner's current
//! master digest. Writes therefore name the digest their key came from, and
//! the store refuses them once that digest has been replaced.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{PasswordRecord, User};
use passvault_common::{Error, RecordId, Result, UserId};
use passvault_crypto::MasterSecretDigest;

/// Persistence collaborator for users and their password records.
///
/// Implementations must scope record lookups by owner: a record that
/// belongs to another user is reported as not found.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a new user.
    ///
    /// # Errors
    /// - `AlreadyExists` if the username is taken
    async fn insert_user(&self, user: User) -> Result<()>;

    /// Look up a user by username.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get a user by id.
    ///
    /// # Errors
    /// - `NotFound` if no such user exists
    async fn get_user(&self, id: &UserId) -> Result<User>;

    /// Store a new password record encrypted under the key of `key_digest`.
    ///
    /// # Errors
    /// - `NotFound` if the owner does not exist
    /// - `Conflict` if `key_digest` is no longer the owner's digest
    async fn insert_record(
        &self,
        record: PasswordRecord,
        key_digest: &MasterSecretDigest,
    ) -> Result<()>;

    /// All records of a user, oldest first.
    async fn list_records(&self, user_id: &UserId) -> Result<Vec<PasswordRecord>>;

    /// Get one record of a user.
    ///
    /// # Errors
    /// - `NotFound` if absent or owned by someone else
    async fn get_record(&self, user_id: &UserId, id: &RecordId) -> Result<PasswordRecord>;

    /// Replace an existing record encrypted under the key of `key_digest`.
    ///
    /// # Errors
    /// - `NotFound` if absent or owned by someone else
    /// - `Conflict` if `key_digest` is no longer the owner's digest
    async fn update_record(
        &self,
        record: PasswordRecord,
        key_digest: &MasterSecretDigest,
    ) -> Result<()>;

    /// Delete one record of a user.
    ///
    /// # Errors
    /// - `NotFound` if absent or owned by someone else
    async fn delete_record(&self, user_id: &UserId, id: &RecordId) -> Result<()>;

    /// Replace a user together with all of their records in one step.
    ///
    /// Used when a master password change re-encrypts every record; either
    /// everything is replaced or nothing is. `previous` is the record set
    /// the replacement was computed from, read while `expected_digest` was
    /// current.
    ///
    /// # Errors
    /// - `NotFound` if the user or one of the records does not exist
    /// - `Conflict` if the stored digest or any stored record of the user
    ///   differs from what the replacement was computed from
    /// - `InvalidInput` if `records` does not cover exactly `previous`
    async fn replace_user_and_records(
        &self,
        user: User,
        expected_digest: &MasterSecretDigest,
        previous: &[PasswordRecord],
        records: Vec<PasswordRecord>,
    ) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    records: HashMap<RecordId, PasswordRecord>,
}

/// In-memory credential store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

fn owned_record<'a>(
    tables: &'a Tables,
    user_id: &UserId,
    id: &RecordId,
) -> Result<&'a PasswordRecord> {
    tables
        .records
        .get(id)
        .filter(|record| &record.user_id == user_id)
        .ok_or_else(|| Error::NotFound(format!("Password record {}", id)))
}

fn require_current_digest(
    tables: &Tables,
    user_id: &UserId,
    digest: &MasterSecretDigest,
) -> Result<()> {
    let user = tables
        .users
        .get(user_id)
        .ok_or_else(|| Error::NotFound(format!("User {}", user_id)))?;
    if &user.master_digest != digest {
        return Err(Error::Conflict(format!(
            "Master password of user {} changed",
            user_id
        )));
    }
    Ok(())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        let mut tables = self.write()?;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(Error::AlreadyExists(format!("Username {}", user.username)));
        }
        if tables.users.contains_key(&user.id) {
            return Err(Error::AlreadyExists(format!("User {}", user.id)));
        }

        tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.read()?;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user(&self, id: &UserId) -> Result<User> {
        let tables = self.read()?;
        tables
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("User {}", id)))
    }

    async fn insert_record(
        &self,
        record: PasswordRecord,
        key_digest: &MasterSecretDigest,
    ) -> Result<()> {
        let mut tables = self.write()?;

        require_current_digest(&tables, &record.user_id, key_digest)?;
        if tables.records.contains_key(&record.id) {
            return Err(Error::AlreadyExists(format!("Password record {}", record.id)));
        }

        tables.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn list_records(&self, user_id: &UserId) -> Result<Vec<PasswordRecord>> {
        let tables = self.read()?;
        let mut records: Vec<PasswordRecord> = tables
            .records
            .values()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(records)
    }

    async fn get_record(&self, user_id: &UserId, id: &RecordId) -> Result<PasswordRecord> {
        let tables = self.read()?;
        owned_record(&tables, user_id, id).cloned()
    }

    async fn update_record(
        &self,
        record: PasswordRecord,
        key_digest: &MasterSecretDigest,
    ) -> Result<()> {
        let mut tables = self.write()?;
        owned_record(&tables, &record.user_id, &record.id)?;
        require_current_digest(&tables, &record.user_id, key_digest)?;
        tables.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_record(&self, user_id: &UserId, id: &RecordId) -> Result<()> {
        let mut tables = self.write()?;
        owned_record(&tables, user_id, id)?;
        tables.records.remove(id);
        Ok(())
    }

    async fn replace_user_and_records(
        &self,
        user: User,
        expected_digest: &MasterSecretDigest,
        previous: &[PasswordRecord],
        records: Vec<PasswordRecord>,
    ) -> Result<()> {
        let mut tables = self.write()?;

        require_current_digest(&tables, &user.id, expected_digest)?;
        for record in &records {
            if record.user_id != user.id {
                return Err(Error::NotFound(format!("Password record {}", record.id)));
            }
            owned_record(&tables, &user.id, &record.id)?;
        }

        let stored = tables
            .records
            .values()
            .filter(|r| r.user_id == user.id)
            .count();
        let unchanged = previous.iter().all(|before| {
            before.user_id == user.id
                && tables
                    .records
                    .get(&before.id)
                    .is_some_and(|current| current == before)
        });
        if stored != previous.len() || !unchanged {
            return Err(Error::Conflict(format!(
                "Records of user {} changed",
                user.id
            )));
        }

        let mut covered: Vec<&RecordId> = records.iter().map(|r| &r.id).collect();
        let mut expected: Vec<&RecordId> = previous.iter().map(|r| &r.id).collect();
        covered.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        if covered != expected {
            return Err(Error::InvalidInput(
                "Replacement must cover every record exactly once".to_string(),
            ));
        }

        for record in records {
            tables.records.insert(record.id.clone(), record);
        }
        tables.users.insert(user.id.clone(), user);
        Ok(())
    }
}
