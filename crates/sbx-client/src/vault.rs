//! Client session: login/sync against sbxd plus offline reads from the local cache
//!
//! ```text
//! LoggedOut ──login/register──▶ LoggedIn ──logout | 401──▶ LoggedOut
//! ```
//!
//! The session is "logged in" exactly when a token file exists. Writes always
//! go to the server; the local cache only changes on login, sync, and logout.

use secrecy::SecretString;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use sbx_core::config::ClientConfig;
use sbx_core::types::{Credentials, Record, RecordInput, RecordResponse, RecordUpdateInput};
use sbx_core::{SbxError, SbxResult};
use sbx_crypto::UserKey;

use crate::api::{ApiClient, LoginResponse};
use crate::store::{LocalStore, StoreBackend};
use crate::token::TokenFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

/// Result of [`ClientVault::list`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordListing {
    /// Local cache, decrypted with the cached user key.
    Decrypted(Vec<RecordResponse>),
    /// Server listing, still sealed.
    Sealed(Vec<Record>),
}

impl RecordListing {
    pub fn len(&self) -> usize {
        match self {
            RecordListing::Decrypted(r) => r.len(),
            RecordListing::Sealed(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub state: SessionState,
    pub server_url: String,
    pub data_dir: PathBuf,
    pub cached_records: usize,
    pub user_key_cached: bool,
}

pub struct ClientVault {
    api: ApiClient,
    store: StoreBackend,
    token_file: TokenFile,
    data_dir: PathBuf,
}

impl ClientVault {
    /// Open the local store and token file under the configured data dir.
    pub fn open(config: &ClientConfig) -> SbxResult<Self> {
        let data_dir = config.data_dir();
        let api = ApiClient::new(
            &config.server_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let store = StoreBackend::open(&data_dir, config.store_backend)?;
        Ok(Self::new(api, store, &data_dir))
    }

    pub fn new(api: ApiClient, store: StoreBackend, data_dir: &Path) -> Self {
        Self {
            api,
            store,
            token_file: TokenFile::new(data_dir),
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn state(&self) -> SbxResult<SessionState> {
        Ok(match self.token_file.load()? {
            Some(_) => SessionState::LoggedIn,
            None => SessionState::LoggedOut,
        })
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Create the account, then run the full login flow so the key and
    /// records are cached.
    pub async fn register(&mut self, credentials: Credentials) -> SbxResult<()> {
        credentials.validate()?;
        self.api.register(&credentials).await?;
        info!(login = %credentials.username, "registered");
        self.login(credentials).await
    }

    pub async fn login(&mut self, credentials: Credentials) -> SbxResult<()> {
        credentials.validate()?;
        self.end_session()?;

        let LoginResponse { token, user_key } = self.api.login(&credentials, true).await?;
        let user_key = user_key
            .ok_or_else(|| SbxError::Network("server did not return the user key".into()))?;

        // Nothing is persisted until the server has answered every request.
        let records = self.api.list(&token).await?;

        if let Err(e) = self.persist_session(&token, &user_key, &records) {
            if let Err(cleanup) = self.end_session() {
                warn!("clearing partial session failed: {cleanup}");
            }
            return Err(e);
        }

        info!(login = %credentials.username, records = records.len(), "logged in");
        Ok(())
    }

    /// Drop the local session. The server call is best-effort.
    pub async fn logout(&mut self) -> SbxResult<()> {
        if let Some(token) = self.token_file.load()? {
            if let Err(e) = self.api.logout(&token).await {
                warn!("server logout failed, clearing local session anyway: {e}");
            }
        }
        self.end_session()?;
        info!("logged out");
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────────────────

    pub async fn add(&mut self, input: RecordInput) -> SbxResult<i64> {
        input.validate()?;
        let token = self.token()?;
        let result = self.api.create(&token, &input).await;
        let id = self.settle(result)?;
        debug!(record_id = id, kind = %input.kind, "record added");
        Ok(id)
    }

    /// One record, decrypted by the server (`remote`) or from the local cache.
    pub async fn get(&mut self, id: i64, remote: bool) -> SbxResult<RecordResponse> {
        let token = self.token()?;
        if remote {
            let result = self.api.get(&token, id).await;
            return self.settle(result);
        }

        let record = self
            .store
            .record(id)?
            .ok_or_else(|| SbxError::NotFound(format!("record {id} in local cache")))?;
        record.open(&self.cached_key()?)
    }

    pub async fn list(&mut self, remote: bool) -> SbxResult<RecordListing> {
        let token = self.token()?;
        if remote {
            let result = self.api.list(&token).await;
            return Ok(RecordListing::Sealed(self.settle(result)?));
        }

        let key = self.cached_key()?;
        let records = self
            .store
            .records()?
            .iter()
            .map(|record| record.open(&key))
            .collect::<SbxResult<Vec<_>>>()?;
        Ok(RecordListing::Decrypted(records))
    }

    pub async fn update(&mut self, id: i64, patch: RecordUpdateInput) -> SbxResult<()> {
        patch.validate()?;
        let token = self.token()?;
        let result = self.api.update(&token, id, &patch).await;
        self.settle(result)
    }

    pub async fn delete(&mut self, id: i64) -> SbxResult<()> {
        let token = self.token()?;
        let result = self.api.delete(&token, id).await;
        self.settle(result)
    }

    /// Replace the local cache with the server's record set.
    pub async fn sync(&mut self) -> SbxResult<usize> {
        let token = self.token()?;
        let result = self.api.list(&token).await;
        let records = self.settle(result)?;
        self.store.replace_records(&records)?;
        info!(records = records.len(), "local cache synced");
        Ok(records.len())
    }

    pub fn status(&self) -> SbxResult<VaultStatus> {
        Ok(VaultStatus {
            state: self.state()?,
            server_url: self.api.base_url().to_string(),
            data_dir: self.data_dir.clone(),
            cached_records: self.store.records()?.len(),
            user_key_cached: self.store.user_key()?.is_some(),
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn token(&self) -> SbxResult<SecretString> {
        self.token_file
            .load()?
            .ok_or_else(|| SbxError::Authentication("not logged in; run `sbx login`".into()))
    }

    fn cached_key(&self) -> SbxResult<UserKey> {
        self.store.user_key()?.ok_or_else(|| {
            SbxError::Authentication("no user key in local cache; run `sbx login`".into())
        })
    }

    /// A token rejection from the server ends the local session.
    fn settle<T>(&mut self, result: SbxResult<T>) -> SbxResult<T> {
        if let Err(e) = &result {
            if e.is_auth_failure() {
                warn!("session rejected by server, logging out: {e}");
                if let Err(cleanup) = self.end_session() {
                    warn!("clearing local session failed: {cleanup}");
                }
            }
        }
        result
    }

    fn persist_session(
        &mut self,
        token: &SecretString,
        user_key: &UserKey,
        records: &[Record],
    ) -> SbxResult<()> {
        self.token_file.save(token)?;
        self.store.put_user_key(user_key)?;
        self.store.replace_records(records)
    }

    fn end_session(&mut self) -> SbxResult<()> {
        self.token_file.remove()?;
        self.store.clear()
    }
}
