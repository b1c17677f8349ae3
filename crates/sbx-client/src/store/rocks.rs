use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use zeroize::Zeroizing;

use sbx_core::types::Record;
use sbx_core::{SbxError, SbxResult};
use sbx_crypto::UserKey;

use super::{sort_newest_first, LocalStore};

const RECORDS_CF: &str = "records";
const KEYS_CF: &str = "keys";
const USER_KEY: &[u8] = b"user_key";

/// RocksDB-backed local store. Writes go straight through; RocksDB's own
/// LOCK file keeps a second process out.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: &Path) -> SbxResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, [RECORDS_CF, KEYS_CF]).map_err(|e| {
            SbxError::Storage(format!("opening RocksDB {}: {e}", path.display()))
        })?;
        Ok(RocksStore { db })
    }

    fn cf(&self, name: &str) -> SbxResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SbxError::Storage(format!("missing column family {name}")))
    }

    fn delete_all(&self, batch: &mut WriteBatch, name: &str) -> SbxResult<()> {
        let cf = self.cf(name)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(storage)?;
            batch.delete_cf(cf, key);
        }
        Ok(())
    }
}

fn storage(e: rocksdb::Error) -> SbxError {
    SbxError::Storage(format!("RocksDB: {e}"))
}

fn decode(bytes: &[u8]) -> SbxResult<Record> {
    serde_json::from_slice(bytes)
        .map_err(|e| SbxError::Storage(format!("decoding cached record: {e}")))
}

impl LocalStore for RocksStore {
    fn put_user_key(&mut self, key: &UserKey) -> SbxResult<()> {
        self.db
            .put_cf(self.cf(KEYS_CF)?, USER_KEY, key.as_bytes())
            .map_err(storage)
    }

    fn user_key(&self) -> SbxResult<Option<UserKey>> {
        match self.db.get_cf(self.cf(KEYS_CF)?, USER_KEY).map_err(storage)? {
            Some(bytes) => {
                let bytes = Zeroizing::new(bytes);
                Ok(Some(UserKey::from_slice(&bytes)?))
            }
            None => Ok(None),
        }
    }

    fn replace_records(&mut self, records: &[Record]) -> SbxResult<()> {
        let mut batch = WriteBatch::default();
        self.delete_all(&mut batch, RECORDS_CF)?;
        let cf = self.cf(RECORDS_CF)?;
        for record in records {
            let value = serde_json::to_vec(record)
                .map_err(|e| SbxError::Storage(format!("encoding record {}: {e}", record.id)))?;
            batch.put_cf(cf, record.id.to_be_bytes(), value);
        }
        self.db.write(batch).map_err(storage)
    }

    fn record(&self, id: i64) -> SbxResult<Option<Record>> {
        self.db
            .get_cf(self.cf(RECORDS_CF)?, id.to_be_bytes())
            .map_err(storage)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn records(&self) -> SbxResult<Vec<Record>> {
        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf(RECORDS_CF)?, IteratorMode::Start) {
            let (_, value) = item.map_err(storage)?;
            records.push(decode(&value)?);
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn clear(&mut self) -> SbxResult<()> {
        let mut batch = WriteBatch::default();
        self.delete_all(&mut batch, RECORDS_CF)?;
        self.delete_all(&mut batch, KEYS_CF)?;
        self.db.write(batch).map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sbx_core::types::RecordType;

    fn record(id: i64) -> Record {
        Record {
            id,
            user_id: 7,
            kind: RecordType::Binary,
            metadata: String::new(),
            data: vec![1, 2, 3],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_rocks_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.rocksdb");
        let key = sbx_crypto::generate_user_key();

        {
            let mut store = RocksStore::open(&path).unwrap();
            store.put_user_key(&key).unwrap();
            store.replace_records(&[record(1), record(2)]).unwrap();
            store.replace_records(&[record(2), record(3)]).unwrap();
        }

        let mut store = RocksStore::open(&path).unwrap();
        assert_eq!(store.user_key().unwrap().unwrap().as_bytes(), key.as_bytes());
        assert!(store.record(1).unwrap().is_none());
        assert_eq!(store.record(3).unwrap().unwrap().id, 3);
        assert_eq!(store.records().unwrap().len(), 2);

        store.clear().unwrap();
        assert!(store.user_key().unwrap().is_none());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_rocks_second_open_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.rocksdb");
        let _held = RocksStore::open(&path).unwrap();
        assert!(matches!(RocksStore::open(&path), Err(SbxError::Storage(_))));
    }
}
