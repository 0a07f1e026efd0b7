//! Vault service: registration, login and per-user credential operations.
//!
//! Composes the crypto core with a `CredentialStore`. Every record
//! operation takes a `RequestContext`, which can only be obtained by
//! verifying an auth token.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{Secrets, VaultConfig};
use crate::models::{NewPassword, PasswordRecord, PasswordUpdate, PasswordView, User};
use crate::store::CredentialStore;
use passvault_common::{Error, RecordId, Result, UserId};
use passvault_crypto::{
    compute_digest, decrypt, derive_key, encrypt, verify, AuthToken, DerivedKey, KdfParams,
    KeyPepper, MasterSecretDigest, TokenSigner,
};

/// Authenticated caller of a record operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    user_id: UserId,
}

impl RequestContext {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// Password vault service.
pub struct VaultService {
    store: Arc<dyn CredentialStore>,
    kdf_params: KdfParams,
    signer: TokenSigner,
    key_pepper: KeyPepper,
    /// Digest checked against when a login names an unknown user, so both
    /// failure paths cost one Argon2id evaluation.
    decoy_digest: OnceCell<MasterSecretDigest>,
}

impl VaultService {
    /// Create a service.
    ///
    /// # Errors
    /// - Returns `Config` error if the configuration is invalid
    pub fn new(
        config: &VaultConfig,
        secrets: &Secrets,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        config.validate()?;
        let signer = TokenSigner::new(secrets.signing_secret(), config.token.clone())?;

        Ok(Self {
            store,
            kdf_params: config.kdf_params.clone(),
            signer,
            key_pepper: secrets.key_pepper().clone(),
            decoy_digest: OnceCell::new(),
        })
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Register a new user.
    ///
    /// # Errors
    /// - `InvalidInput` if username or master password is empty
    /// - `AlreadyExists` if the username is taken
    pub async fn register(&self, username: &str, master_password: &str) -> Result<User> {
        if username.trim().is_empty() {
            return Err(Error::InvalidInput("Username cannot be empty".to_string()));
        }
        if master_password.is_empty() {
            return Err(Error::InvalidInput("Master password cannot be empty".to_string()));
        }
        if self.store.find_user_by_username(username).await?.is_some() {
            return Err(Error::AlreadyExists(format!("Username {}", username)));
        }

        let digest = self.digest_blocking(master_password).await?;
        let user = User::new(username, digest);
        self.store.insert_user(user.clone()).await?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check a master password and issue a token.
    ///
    /// # Errors
    /// - `AuthenticationFailed` for an unknown user or a wrong password;
    ///   the two cases are indistinguishable to the caller
    pub async fn login(&self, username: &str, master_password: &str) -> Result<AuthToken> {
        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                let decoy = self.decoy_digest().await?;
                self.verify_blocking(master_password, decoy.clone()).await?;
                warn!("Login failed");
                return Err(Error::AuthenticationFailed);
            }
        };

        if !self
            .verify_blocking(master_password, user.master_digest.clone())
            .await?
        {
            warn!(user_id = %user.id, "Login failed");
            return Err(Error::AuthenticationFailed);
        }

        let token = self.signer.issue(&user.id)?;
        info!(user_id = %user.id, "User logged in");
        Ok(token)
    }

    /// Verify a token and build the context for record operations.
    pub fn authenticate(&self, token: &AuthToken) -> Result<RequestContext> {
        let user_id = self.signer.verify(token).map_err(|e| {
            debug!(error = %e, "Token rejected");
            e
        })?;
        Ok(RequestContext { user_id })
    }

    /// All credentials of the caller, decrypted.
    ///
    /// # Errors
    /// - `Conflict` if the master password changed while listing
    pub async fn list_passwords(&self, ctx: &RequestContext) -> Result<Vec<PasswordView>> {
        let (digest, key) = self.record_key(ctx).await?;
        let records = self.store.list_records(ctx.user_id()).await?;

        // Digests are salted, so an unchanged digest means no rotation ran
        // between the two reads.
        if self.store.get_user(ctx.user_id()).await?.master_digest != digest {
            return Err(Error::Conflict("Master password changed".to_string()));
        }

        let views = records
            .iter()
            .map(|record| view(record, &key))
            .collect::<Result<Vec<_>>>()?;

        debug!(user_id = %ctx.user_id(), count = views.len(), "Listed passwords");
        Ok(views)
    }

    /// Store a new credential for the caller.
    ///
    /// # Errors
    /// - `InvalidInput` if website or username is empty
    /// - `Conflict` if the master password changed meanwhile
    pub async fn add_password(
        &self,
        ctx: &RequestContext,
        new: NewPassword,
    ) -> Result<PasswordView> {
        require_non_empty("website", &new.website)?;
        require_non_empty("username", &new.username)?;

        let (digest, key) = self.record_key(ctx).await?;
        let encrypted = encrypt(&new.password, &key)?;
        let record = PasswordRecord::new(ctx.user_id().clone(), new.website, new.username, encrypted);
        self.store.insert_record(record.clone(), &digest).await?;

        info!(user_id = %ctx.user_id(), record_id = %record.id, "Password added");
        Ok(PasswordView {
            id: record.id,
            website: record.website,
            username: record.username,
            password: new.password,
        })
    }

    /// Change some fields of one of the caller's credentials.
    ///
    /// The password is re-encrypted only if a new one is supplied.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist or belongs to someone else
    /// - `InvalidInput` if a supplied website or username is empty
    /// - `Conflict` if the master password changed meanwhile
    pub async fn update_password(
        &self,
        ctx: &RequestContext,
        id: &RecordId,
        update: PasswordUpdate,
    ) -> Result<PasswordView> {
        if let Some(website) = &update.website {
            require_non_empty("website", website)?;
        }
        if let Some(username) = &update.username {
            require_non_empty("username", username)?;
        }

        let existing = self.store.get_record(ctx.user_id(), id).await?;
        let (digest, key) = self.record_key(ctx).await?;

        let encrypted = match &update.password {
            Some(password) => Some(encrypt(password, &key)?),
            None => None,
        };
        let record = existing.updated(update.website, update.username, encrypted);
        self.store.update_record(record.clone(), &digest).await?;

        info!(user_id = %ctx.user_id(), record_id = %record.id, "Password updated");
        view(&record, &key)
    }

    /// Delete one of the caller's credentials.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist or belongs to someone else
    pub async fn delete_password(&self, ctx: &RequestContext, id: &RecordId) -> Result<()> {
        self.store.delete_record(ctx.user_id(), id).await?;
        info!(user_id = %ctx.user_id(), record_id = %id, "Password deleted");
        Ok(())
    }

    /// Replace the caller's master password.
    ///
    /// The record key follows the digest, so every stored password is
    /// decrypted under the old key and re-encrypted under the new one.
    ///
    /// # Errors
    /// - `AuthenticationFailed` if `old_password` is wrong
    /// - `InvalidInput` if `new_password` is empty
    /// - `Conflict` if records were written while re-encrypting; nothing is
    ///   changed and the call can be retried
    pub async fn change_master_password(
        &self,
        ctx: &RequestContext,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::InvalidInput("Master password cannot be empty".to_string()));
        }

        let user = self.store.get_user(ctx.user_id()).await?;
        if !self
            .verify_blocking(old_password, user.master_digest.clone())
            .await?
        {
            warn!(user_id = %user.id, "Master password change rejected");
            return Err(Error::AuthenticationFailed);
        }

        let new_digest = self.digest_blocking(new_password).await?;
        let old_key = derive_key(&user.master_digest, &self.key_pepper)?;
        let new_key = derive_key(&new_digest, &self.key_pepper)?;

        let records = self.store.list_records(&user.id).await?;
        let reencrypted = records
            .iter()
            .map(|record| -> Result<PasswordRecord> {
                let plaintext = Zeroizing::new(decrypt(&record.encrypted_password, &old_key)?);
                Ok(record.reencrypted(encrypt(&plaintext, &new_key)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let count = reencrypted.len();
        self.store
            .replace_user_and_records(
                user.with_digest(new_digest),
                &user.master_digest,
                &records,
                reencrypted,
            )
            .await
            .map_err(|e| {
                if matches!(e, Error::Conflict(_)) {
                    warn!(user_id = %user.id, "Master password change lost a race");
                }
                e
            })?;

        info!(user_id = %user.id, records = count, "Master password changed");
        Ok(())
    }

    /// Key for the caller's records, with the digest it was derived from.
    async fn record_key(&self, ctx: &RequestContext) -> Result<(MasterSecretDigest, DerivedKey)> {
        let user = self.store.get_user(ctx.user_id()).await?;
        let key = derive_key(&user.master_digest, &self.key_pepper)?;
        Ok((user.master_digest, key))
    }

    async fn decoy_digest(&self) -> Result<&MasterSecretDigest> {
        self.decoy_digest
            .get_or_try_init(|| self.digest_blocking("passvault-decoy"))
            .await
    }

    /// Argon2id is CPU-bound, so it runs off the async worker threads.
    async fn digest_blocking(&self, password: &str) -> Result<MasterSecretDigest> {
        let password = Zeroizing::new(password.to_string());
        let params = self.kdf_params.clone();

        tokio::task::spawn_blocking(move || compute_digest(&password, &params))
            .await
            .map_err(|e| Error::Crypto(format!("Digest task failed: {}", e)))?
    }

    async fn verify_blocking(&self, password: &str, digest: MasterSecretDigest) -> Result<bool> {
        let password = Zeroizing::new(password.to_string());

        tokio::task::spawn_blocking(move || verify(&password, &digest))
            .await
            .map_err(|e| Error::Crypto(format!("Digest task failed: {}", e)))
    }
}

fn view(record: &PasswordRecord, key: &DerivedKey) -> Result<PasswordView> {
    Ok(PasswordView {
        id: record.id.clone(),
        website: record.website.clone(),
        username: record.username.clone(),
        password: decrypt(&record.encrypted_password, key)?,
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use passvault_crypto::TokenSettings;
    use std::sync::Mutex;

    fn test_config() -> VaultConfig {
        VaultConfig::new(
            KdfParams {
                memory_cost: 8192,
                time_cost: 1,
                parallelism: 1,
                output_len: 32,
            },
            TokenSettings::default(),
        )
    }

    fn service_with(store: Arc<MemoryStore>, secrets: &Secrets) -> VaultService {
        VaultService::new(&test_config(), secrets, store).unwrap()
    }

    fn setup() -> (VaultService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (service_with(store.clone(), &Secrets::generate()), store)
    }

    enum RacingWrite {
        Insert(PasswordRecord),
        Update(PasswordRecord),
    }

    /// Memory store that lands one extra write right before a master
    /// password change commits, the way a concurrent request would.
    #[derive(Default)]
    struct InterleavingStore {
        inner: MemoryStore,
        pending: Mutex<Option<(RacingWrite, MasterSecretDigest)>>,
    }

    impl InterleavingStore {
        fn before_replace(&self, write: RacingWrite, key_digest: MasterSecretDigest) {
            *self.pending.lock().unwrap() = Some((write, key_digest));
        }
    }

    #[async_trait]
    impl CredentialStore for InterleavingStore {
        async fn insert_user(&self, user: User) -> Result<()> {
            self.inner.insert_user(user).await
        }

        async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
            self.inner.find_user_by_username(username).await
        }

        async fn get_user(&self, id: &UserId) -> Result<User> {
            self.inner.get_user(id).await
        }

        async fn insert_record(
            &self,
            record: PasswordRecord,
            key_digest: &MasterSecretDigest,
        ) -> Result<()> {
            self.inner.insert_record(record, key_digest).await
        }

        async fn list_records(&self, user_id: &UserId) -> Result<Vec<PasswordRecord>> {
            self.inner.list_records(user_id).await
        }

        async fn get_record(&self, user_id: &UserId, id: &RecordId) -> Result<PasswordRecord> {
            self.inner.get_record(user_id, id).await
        }

        async fn update_record(
            &self,
            record: PasswordRecord,
            key_digest: &MasterSecretDigest,
        ) -> Result<()> {
            self.inner.update_record(record, key_digest).await
        }

        async fn delete_record(&self, user_id: &UserId, id: &RecordId) -> Result<()> {
            self.inner.delete_record(user_id, id).await
        }

        async fn replace_user_and_records(
            &self,
            user: User,
            expected_digest: &MasterSecretDigest,
            previous: &[PasswordRecord],
            records: Vec<PasswordRecord>,
        ) -> Result<()> {
            let pending = self.pending.lock().unwrap().take();
            match pending {
                Some((RacingWrite::Insert(record), digest)) => {
                    self.inner.insert_record(record, &digest).await?
                }
                Some((RacingWrite::Update(record), digest)) => {
                    self.inner.update_record(record, &digest).await?
                }
                None => {}
            }
            self.inner
                .replace_user_and_records(user, expected_digest, previous, records)
                .await
        }
    }

    async fn sorted_passwords(service: &VaultService, ctx: &RequestContext) -> Vec<String> {
        let mut passwords: Vec<String> = service
            .list_passwords(ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.password)
            .collect();
        passwords.sort();
        passwords
    }

    async fn logged_in(service: &VaultService, username: &str, password: &str) -> RequestContext {
        service.register(username, password).await.unwrap();
        let token = service.login(username, password).await.unwrap();
        service.authenticate(&token).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (service, _) = setup();

        let user = service.register("alice", "correct-horse").await.unwrap();
        let token = service.login("alice", "correct-horse").await.unwrap();
        let ctx = service.authenticate(&token).unwrap();

        assert_eq!(ctx.user_id(), &user.id);
    }

    #[tokio::test]
    async fn test_digest_is_not_the_password() {
        let (service, store) = setup();
        let user = service.register("alice", "correct-horse").await.unwrap();

        let stored = store.get_user(&user.id).await.unwrap();
        assert!(!stored.master_digest.as_str().contains("correct-horse"));
        assert!(stored.master_digest.as_str().starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (service, _) = setup();
        service.register("alice", "correct-horse").await.unwrap();

        let result = service.register("alice", "other").await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let (service, _) = setup();
        assert!(matches!(
            service.register("", "pw").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.register("alice", "").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_gets_no_token() {
        let (service, _) = setup();
        service.register("alice", "correct-horse").await.unwrap();

        let result = service.login("alice", "battery-staple").await;
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_unknown_user_gets_same_error() {
        let (service, _) = setup();

        let result = service.login("nobody", "correct-horse").await;
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_add_and_retrieve_password() {
        let (service, store) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;

        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();
        assert_eq!(added.password, "s3cr3t");

        let stored = store.get_record(ctx.user_id(), &added.id).await.unwrap();
        assert!(!stored.encrypted_password.as_str().contains("s3cr3t"));

        let listed = service.list_passwords(&ctx).await.unwrap();
        assert_eq!(listed, vec![added]);
        assert_eq!(listed[0].website, "example.com");
        assert_eq!(listed[0].username, "alice2");
        assert_eq!(listed[0].password, "s3cr3t");
    }

    #[tokio::test]
    async fn test_update_website_keeps_password() {
        let (service, store) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();
        let before = store.get_record(ctx.user_id(), &added.id).await.unwrap();

        let updated = service
            .update_password(&ctx, &added.id, PasswordUpdate::website("example.org"))
            .await
            .unwrap();

        assert_eq!(updated.website, "example.org");
        assert_eq!(updated.username, "alice2");
        assert_eq!(updated.password, "s3cr3t");

        let after = store.get_record(ctx.user_id(), &added.id).await.unwrap();
        assert_eq!(after.encrypted_password, before.encrypted_password);

        let listed = service.list_passwords(&ctx).await.unwrap();
        assert_eq!(listed[0].password, "s3cr3t");
    }

    #[tokio::test]
    async fn test_update_password_reencrypts() {
        let (service, store) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();
        let before = store.get_record(ctx.user_id(), &added.id).await.unwrap();

        let updated = service
            .update_password(&ctx, &added.id, PasswordUpdate::password("n3w-s3cr3t"))
            .await
            .unwrap();
        assert_eq!(updated.password, "n3w-s3cr3t");
        assert_eq!(updated.website, "example.com");

        let after = store.get_record(ctx.user_id(), &added.id).await.unwrap();
        assert_ne!(after.encrypted_password, before.encrypted_password);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_website() {
        let (service, _) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();

        let result = service
            .update_password(&ctx, &added.id, PasswordUpdate::website("  "))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_add_rejects_empty_website() {
        let (service, _) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;

        let result = service
            .add_password(&ctx, NewPassword::new("", "alice2", "s3cr3t"))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_users_cannot_touch_each_other() {
        let (service, _) = setup();
        let alice = logged_in(&service, "alice", "correct-horse").await;
        let bob = logged_in(&service, "bob", "hunter2").await;

        let added = service
            .add_password(&alice, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();

        assert!(service.list_passwords(&bob).await.unwrap().is_empty());
        assert!(matches!(
            service
                .update_password(&bob, &added.id, PasswordUpdate::password("pwned"))
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.delete_password(&bob, &added.id).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(service.list_passwords(&alice).await.unwrap()[0].password, "s3cr3t");
    }

    #[tokio::test]
    async fn test_delete_password() {
        let (service, _) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();

        service.delete_password(&ctx, &added.id).await.unwrap();

        assert!(service.list_passwords(&ctx).await.unwrap().is_empty());
        assert!(matches!(
            service.delete_password(&ctx, &added.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_master_password() {
        let (service, _) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        for (site, pw) in [("a.example", "one"), ("b.example", "two")] {
            service
                .add_password(&ctx, NewPassword::new(site, "alice", pw))
                .await
                .unwrap();
        }

        service
            .change_master_password(&ctx, "correct-horse", "battery-staple")
            .await
            .unwrap();

        assert!(matches!(
            service.login("alice", "correct-horse").await,
            Err(Error::AuthenticationFailed)
        ));
        let token = service.login("alice", "battery-staple").await.unwrap();
        let ctx = service.authenticate(&token).unwrap();

        assert_eq!(sorted_passwords(&service, &ctx).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_change_master_password_conflicts_with_racing_add() {
        let store = Arc::new(InterleavingStore::default());
        let secrets = Secrets::generate();
        let service = VaultService::new(&test_config(), &secrets, store.clone()).unwrap();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        service
            .add_password(&ctx, NewPassword::new("a.example", "alice", "one"))
            .await
            .unwrap();

        // An add that derived its key from the old digest.
        let user = store.get_user(ctx.user_id()).await.unwrap();
        let old_key = derive_key(&user.master_digest, secrets.key_pepper()).unwrap();
        let racing = PasswordRecord::new(
            user.id.clone(),
            "b.example",
            "alice",
            encrypt("two", &old_key).unwrap(),
        );
        store.before_replace(RacingWrite::Insert(racing), user.master_digest.clone());

        let result = service
            .change_master_password(&ctx, "correct-horse", "battery-staple")
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        // Nothing rotated; every record still decrypts.
        assert!(service.login("alice", "correct-horse").await.is_ok());
        assert_eq!(sorted_passwords(&service, &ctx).await, vec!["one", "two"]);

        service
            .change_master_password(&ctx, "correct-horse", "battery-staple")
            .await
            .unwrap();
        assert_eq!(sorted_passwords(&service, &ctx).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_change_master_password_keeps_racing_update() {
        let store = Arc::new(InterleavingStore::default());
        let secrets = Secrets::generate();
        let service = VaultService::new(&test_config(), &secrets, store.clone()).unwrap();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let added = service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();

        let user = store.get_user(ctx.user_id()).await.unwrap();
        let old_key = derive_key(&user.master_digest, secrets.key_pepper()).unwrap();
        let stored = store.get_record(&user.id, &added.id).await.unwrap();
        let racing = stored.updated(None, None, Some(encrypt("n3w", &old_key).unwrap()));
        store.before_replace(RacingWrite::Update(racing), user.master_digest.clone());

        let result = service
            .change_master_password(&ctx, "correct-horse", "battery-staple")
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(sorted_passwords(&service, &ctx).await, vec!["n3w"]);
    }

    #[tokio::test]
    async fn test_write_after_change_is_rejected() {
        let (service, store) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        let stale_digest = store.get_user(ctx.user_id()).await.unwrap().master_digest;

        service
            .change_master_password(&ctx, "correct-horse", "battery-staple")
            .await
            .unwrap();

        let late = PasswordRecord::new(
            ctx.user_id().clone(),
            "example.com",
            "alice2",
            passvault_crypto::EncryptedRecord::from_string("old-key-ciphertext"),
        );
        assert!(matches!(
            store.insert_record(late, &stale_digest).await,
            Err(Error::Conflict(_))
        ));
        assert!(service.list_passwords(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_master_password_wrong_old() {
        let (service, _) = setup();
        let ctx = logged_in(&service, "alice", "correct-horse").await;

        let result = service
            .change_master_password(&ctx, "wrong", "battery-staple")
            .await;
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
        assert!(service.login("alice", "correct-horse").await.is_ok());
    }

    #[tokio::test]
    async fn test_records_need_the_pepper() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), &Secrets::generate());
        let ctx = logged_in(&service, "alice", "correct-horse").await;
        service
            .add_password(&ctx, NewPassword::new("example.com", "alice2", "s3cr3t"))
            .await
            .unwrap();

        // Same store, different pepper.
        let secrets = Secrets::new(
            passvault_crypto::SigningSecret::generate(),
            KeyPepper::generate(),
        );
        let other = service_with(store, &secrets);
        let token = other.login("alice", "correct-horse").await.unwrap();
        let other_ctx = other.authenticate(&token).unwrap();

        assert!(matches!(
            other.list_passwords(&other_ctx).await,
            Err(Error::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (service, _) = setup();
        let user = service.register("alice", "correct-horse").await.unwrap();

        let token = service
            .signer()
            .issue_at(&user.id, Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(
            service.authenticate(&token),
            Err(Error::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_foreign_token_rejected() {
        let (service, _) = setup();
        let (other, _) = setup();
        let user = other.register("alice", "correct-horse").await.unwrap();
        let token = other.signer().issue(&user.id).unwrap();

        assert!(matches!(
            service.authenticate(&token),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.token.ttl_secs = 0;
        let result = VaultService::new(
            &config,
            &Secrets::generate(),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_kdf_output_shorter_than_key_rejected() {
        let mut config = test_config();
        config.kdf_params.output_len = 16;
        let result = VaultService::new(
            &config,
            &Secrets::generate(),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
