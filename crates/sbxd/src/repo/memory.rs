//! In-memory repository. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use sbx_core::types::{Record, User};
use sbx_core::{SbxError, SbxResult};

use super::{record_not_found, NewRecord, NewUser, RecordPatch, RecordRepository, UserRepository};

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    logins: HashMap<String, i64>,
    records: BTreeMap<i64, Record>,
    next_user_id: i64,
    next_record_id: i64,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> SbxResult<i64> {
        let mut t = self.tables.write().await;
        if t.logins.contains_key(&user.login) {
            return Err(SbxError::AlreadyExists(format!("user {:?}", user.login)));
        }
        t.next_user_id += 1;
        let id = t.next_user_id;
        t.logins.insert(user.login.clone(), id);
        t.users.insert(
            id,
            User {
                id,
                login: user.login,
                password_hash: user.password_hash,
                encrypted_user_key: user.encrypted_user_key,
            },
        );
        Ok(id)
    }

    async fn find_by_login(&self, login: &str) -> SbxResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.logins.get(login).and_then(|id| t.users.get(id)).cloned())
    }

    async fn encrypted_user_key(&self, user_id: i64) -> SbxResult<String> {
        let t = self.tables.read().await;
        t.users
            .get(&user_id)
            .map(|u| u.encrypted_user_key.clone())
            .ok_or_else(|| SbxError::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl RecordRepository for MemoryRepository {
    async fn create_record(&self, record: NewRecord) -> SbxResult<i64> {
        let mut t = self.tables.write().await;
        t.next_record_id += 1;
        let id = t.next_record_id;
        let now = Utc::now();
        t.records.insert(
            id,
            Record {
                id,
                user_id: record.user_id,
                kind: record.kind,
                metadata: record.metadata,
                data: record.data,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn list_records(&self, user_id: i64) -> SbxResult<Vec<Record>> {
        let t = self.tables.read().await;
        // Ids grow monotonically, so reverse id order breaks created_at ties.
        let mut records: Vec<Record> = t
            .records
            .values()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get_record(&self, user_id: i64, record_id: i64) -> SbxResult<Record> {
        let t = self.tables.read().await;
        t.records
            .get(&record_id)
            .filter(|r| r.user_id == user_id)
            .cloned()
            .ok_or_else(|| record_not_found(record_id))
    }

    async fn delete_record(&self, user_id: i64, record_id: i64) -> SbxResult<()> {
        let mut t = self.tables.write().await;
        match t.records.get(&record_id) {
            Some(r) if r.user_id == user_id => {
                t.records.remove(&record_id);
                Ok(())
            }
            _ => Err(record_not_found(record_id)),
        }
    }

    async fn update_record(
        &self,
        user_id: i64,
        record_id: i64,
        patch: RecordPatch,
    ) -> SbxResult<()> {
        let mut t = self.tables.write().await;
        let record = t
            .records
            .get_mut(&record_id)
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| record_not_found(record_id))?;
        if let Some(metadata) = patch.metadata {
            record.metadata = metadata;
        }
        if let Some(data) = patch.data {
            record.data = data;
        }
        record.updated_at = Utc::now();
        Ok(())
    }
}
