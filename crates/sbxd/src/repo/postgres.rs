//! Postgres repository via sqlx. Migrations run on connect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};

use sbx_core::types::{Record, RecordType, User};
use sbx_core::{SbxError, SbxResult};

use super::{record_not_found, NewRecord, NewUser, RecordPatch, RecordRepository, UserRepository};

const RECORD_COLUMNS: &str = "id, user_id, type, metadata, data, created_at, updated_at";

/// Cheap to clone (the pool is an Arc internally).
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> SbxResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(storage)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SbxError::Storage(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> SbxError {
    SbxError::Storage(e.to_string())
}

fn record_from_row(row: &PgRow) -> SbxResult<Record> {
    let kind: String = row.try_get("type").map_err(storage)?;
    Ok(Record {
        id: row.try_get("id").map_err(storage)?,
        user_id: row.try_get("user_id").map_err(storage)?,
        kind: kind
            .parse::<RecordType>()
            .map_err(|_| SbxError::Storage(format!("unknown record type in database: {kind}")))?,
        metadata: row.try_get("metadata").map_err(storage)?,
        data: row.try_get("data").map_err(storage)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(storage)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(storage)?,
    })
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn create_user(&self, user: NewUser) -> SbxResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (login, password_hash, encrypted_key) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(&user.encrypted_user_key)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_get("id").map_err(storage),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SbxError::AlreadyExists(format!("user {:?}", user.login)))
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn find_by_login(&self, login: &str) -> SbxResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, login, password_hash, encrypted_key FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(|row| {
            Ok(User {
                id: row.try_get("id").map_err(storage)?,
                login: row.try_get("login").map_err(storage)?,
                password_hash: row.try_get("password_hash").map_err(storage)?,
                encrypted_user_key: row.try_get("encrypted_key").map_err(storage)?,
            })
        })
        .transpose()
    }

    async fn encrypted_user_key(&self, user_id: i64) -> SbxResult<String> {
        let row = sqlx::query("SELECT encrypted_key FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| SbxError::NotFound(format!("user {user_id}")))?;
        row.try_get("encrypted_key").map_err(storage)
    }

    async fn ping(&self) -> SbxResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(storage)
    }
}

#[async_trait]
impl RecordRepository for PgRepository {
    async fn create_record(&self, record: NewRecord) -> SbxResult<i64> {
        let row = sqlx::query(
            "INSERT INTO records (user_id, type, metadata, data) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(record.user_id)
        .bind(record.kind.as_str())
        .bind(&record.metadata)
        .bind(&record.data)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        row.try_get("id").map_err(storage)
    }

    async fn list_records(&self, user_id: i64) -> SbxResult<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get_record(&self, user_id: i64, record_id: i64) -> SbxResult<Record> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = $1 AND user_id = $2"
        ))
        .bind(record_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| record_not_found(record_id))?;

        record_from_row(&row)
    }

    async fn delete_record(&self, user_id: i64, record_id: i64) -> SbxResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1 AND user_id = $2")
            .bind(record_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(record_not_found(record_id));
        }
        Ok(())
    }

    async fn update_record(
        &self,
        user_id: i64,
        record_id: i64,
        patch: RecordPatch,
    ) -> SbxResult<()> {
        let result = sqlx::query(
            "UPDATE records SET \
                metadata = COALESCE($3, metadata), \
                data = COALESCE($4, data), \
                updated_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(record_id)
        .bind(user_id)
        .bind(patch.metadata)
        .bind(patch.data)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(record_not_found(record_id));
        }
        Ok(())
    }
}
