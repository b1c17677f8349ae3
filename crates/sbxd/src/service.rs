//! VaultService: registration, login and record CRUD on top of the repositories
//!
//! The user key is unwrapped from storage on every record operation and
//! dropped (zeroized) when the operation returns. There is no key cache.

use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use sbx_core::types::{
    seal_data, Credentials, Record, RecordInput, RecordResponse, RecordUpdateInput,
};
use sbx_core::{SbxError, SbxResult};
use sbx_crypto::{KeyHierarchy, PasswordHasher, UserKey};

use crate::repo::{NewRecord, NewUser, RecordPatch, RecordRepository, UserRepository};
use crate::token::{IssuedToken, SessionTokenManager};

/// Result of a successful login.
pub struct LoginOutcome {
    pub token: IssuedToken,
    /// Base64 of the unwrapped user key, present only when it was asked for.
    pub user_key: Option<Zeroizing<String>>,
}

pub struct VaultService {
    users: Arc<dyn UserRepository>,
    records: Arc<dyn RecordRepository>,
    keys: KeyHierarchy,
    hasher: PasswordHasher,
    tokens: SessionTokenManager,
    /// Verified against when the login is unknown, so both failure paths cost the same.
    dummy_hash: OnceCell<String>,
}

impl VaultService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        records: Arc<dyn RecordRepository>,
        keys: KeyHierarchy,
        hasher: PasswordHasher,
        tokens: SessionTokenManager,
    ) -> Self {
        Self {
            users,
            records,
            keys,
            hasher,
            tokens,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn tokens(&self) -> &SessionTokenManager {
        &self.tokens
    }

    /// Readiness: can we reach storage?
    pub async fn ping(&self) -> SbxResult<()> {
        self.users.ping().await
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    pub async fn register(&self, credentials: Credentials) -> SbxResult<IssuedToken> {
        credentials.validate()?;
        let Credentials { username, password } = credentials;

        if self.users.find_by_login(&username).await?.is_some() {
            return Err(SbxError::AlreadyExists(format!("user {username:?}")));
        }

        let password_hash = self.hash_password(password).await?;
        let encrypted_user_key = self.keys.generate_wrapped_user_key()?;

        let user_id = self
            .users
            .create_user(NewUser {
                login: username.clone(),
                password_hash,
                encrypted_user_key,
            })
            .await?;

        info!(user_id, "user registered");
        self.tokens.generate(user_id, &username)
    }

    /// Authenticate. The password is checked before the user key is touched.
    pub async fn login(&self, credentials: Credentials, want_key: bool) -> SbxResult<LoginOutcome> {
        credentials.validate()?;
        let Credentials { username, password } = credentials;

        let Some(user) = self.users.find_by_login(&username).await? else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| self.hash_password(SecretString::from("strongbox")))
                .await?
                .clone();
            let _ = self.verify_password(dummy, password).await;
            debug!("login for unknown user");
            return Err(SbxError::IncorrectPassword);
        };

        if !self
            .verify_password(user.password_hash.clone(), password)
            .await?
        {
            warn!(user_id = user.id, "login with wrong password");
            return Err(SbxError::IncorrectPassword);
        }

        let user_key = if want_key {
            let key = self.unwrap(user.id, &user.encrypted_user_key)?;
            Some(key.to_base64())
        } else {
            None
        };

        info!(user_id = user.id, with_key = want_key, "user logged in");
        Ok(LoginOutcome {
            token: self.tokens.generate(user.id, &user.login)?,
            user_key,
        })
    }

    // ── Records ──────────────────────────────────────────────────────────

    pub async fn create(&self, user_id: i64, input: RecordInput) -> SbxResult<i64> {
        input.validate()?;
        let key = self.user_key(user_id).await?;
        let data = seal_data(&key, &input.data)?;
        drop(key);

        let record_id = self
            .records
            .create_record(NewRecord {
                user_id,
                kind: input.kind,
                metadata: input.metadata,
                data,
            })
            .await?;

        info!(user_id, record_id, kind = %input.kind, "record created");
        Ok(record_id)
    }

    /// Ciphertext rows, newest first.
    pub async fn list(&self, user_id: i64) -> SbxResult<Vec<Record>> {
        self.records.list_records(user_id).await
    }

    pub async fn get(&self, user_id: i64, record_id: i64) -> SbxResult<RecordResponse> {
        let record = self.records.get_record(user_id, record_id).await?;
        let key = self.user_key(user_id).await?;
        record.open(&key).inspect_err(|e| {
            error!(user_id, record_id, integrity = true, "record decryption failed: {e}");
        })
    }

    pub async fn delete(&self, user_id: i64, record_id: i64) -> SbxResult<()> {
        self.records.delete_record(user_id, record_id).await?;
        info!(user_id, record_id, "record deleted");
        Ok(())
    }

    /// Rejects an empty update before storage is touched.
    pub async fn update(
        &self,
        user_id: i64,
        record_id: i64,
        input: RecordUpdateInput,
    ) -> SbxResult<()> {
        input.validate()?;

        let data = match &input.data {
            Some(value) => {
                let key = self.user_key(user_id).await?;
                Some(seal_data(&key, value)?)
            }
            None => None,
        };

        self.records
            .update_record(
                user_id,
                record_id,
                RecordPatch {
                    metadata: input.metadata,
                    data,
                },
            )
            .await?;

        info!(user_id, record_id, "record updated");
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn user_key(&self, user_id: i64) -> SbxResult<UserKey> {
        let wrapped = self
            .users
            .encrypted_user_key(user_id)
            .await
            .map_err(|e| match e {
                SbxError::NotFound(_) => SbxError::Authentication("account no longer exists".into()),
                other => other,
            })?;
        self.unwrap(user_id, &wrapped)
    }

    fn unwrap(&self, user_id: i64, wrapped: &str) -> SbxResult<UserKey> {
        self.keys.unwrap_user_key(wrapped).map_err(|e| {
            error!(user_id, integrity = true, "user key unwrap failed: {e}");
            SbxError::from(e)
        })
    }

    async fn hash_password(&self, password: SecretString) -> SbxResult<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| SbxError::Other(anyhow::anyhow!("password hashing task: {e}")))?
            .map_err(SbxError::from)
    }

    async fn verify_password(&self, encoded: String, password: SecretString) -> SbxResult<bool> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&encoded, &password))
            .await
            .map_err(|e| SbxError::Other(anyhow::anyhow!("password verify task: {e}")))?
            .map_err(SbxError::from)
    }
}
