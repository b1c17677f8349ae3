//! Persistence seams for users and records
//!
//! Two implementations:
//!   - **Postgres** (`PgRepository`): production, via sqlx.
//!   - **Memory** (`MemoryRepository`): used when no database URL is configured
//!     and by tests.
//!
//! Every record query takes both `user_id` and `record_id`; a miss on either
//! is indistinguishable from a record that never existed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sbx_core::types::{Record, RecordType, User};
use sbx_core::SbxResult;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Account row to insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub encrypted_user_key: String,
}

/// Record row to insert. `data` is already sealed.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub user_id: i64,
    pub kind: RecordType,
    pub metadata: String,
    pub data: Vec<u8>,
}

/// Column-level patch. `None` leaves the column as stored.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub metadata: Option<String>,
    pub data: Option<Vec<u8>>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `AlreadyExists` if the login is taken.
    async fn create_user(&self, user: NewUser) -> SbxResult<i64>;

    async fn find_by_login(&self, login: &str) -> SbxResult<Option<User>>;

    /// Wrapped user key for `user_id`. `NotFound` if the user is gone.
    async fn encrypted_user_key(&self, user_id: i64) -> SbxResult<String>;

    /// Cheap liveness check for readiness probes.
    async fn ping(&self) -> SbxResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn create_record(&self, record: NewRecord) -> SbxResult<i64>;

    /// All records of `user_id`, newest first.
    async fn list_records(&self, user_id: i64) -> SbxResult<Vec<Record>>;

    async fn get_record(&self, user_id: i64, record_id: i64) -> SbxResult<Record>;

    async fn delete_record(&self, user_id: i64, record_id: i64) -> SbxResult<()>;

    /// Apply `patch` and refresh `updated_at`.
    async fn update_record(&self, user_id: i64, record_id: i64, patch: RecordPatch)
        -> SbxResult<()>;
}

pub(crate) fn record_not_found(record_id: i64) -> sbx_core::SbxError {
    sbx_core::SbxError::NotFound(format!("record {record_id}"))
}
