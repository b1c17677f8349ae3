use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, Zeroizing};

use sbx_core::types::Record;
use sbx_core::{SbxError, SbxResult};
use sbx_crypto::UserKey;

use super::{sort_newest_first, write_private, LocalStore};

/// On-disk layout of the JSON store.
#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    /// Base64 of the unwrapped user key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_key: Option<String>,
    #[serde(default)]
    records: BTreeMap<i64, Record>,
}

impl Drop for CacheFile {
    fn drop(&mut self) {
        self.user_key.zeroize();
    }
}

/// Local store kept in memory and persisted to a single JSON file.
pub struct JsonStore {
    path: PathBuf,
    cache: CacheFile,
    /// Holds the exclusive advisory lock until the store is dropped.
    _lock: File,
}

impl JsonStore {
    /// Open the store at `path`, taking the lock file next to it.
    ///
    /// Fails with a storage error if another process holds the lock.
    pub fn open(path: &Path) -> SbxResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SbxError::Storage(format!("creating {}: {e}", parent.display())))?;
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| SbxError::Storage(format!("opening {}: {e}", lock_path.display())))?;
        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(SbxError::Storage(format!(
                    "local store {} is in use by another sbx process",
                    path.display()
                )))
            }
            Err(TryLockError::Error(e)) => {
                return Err(SbxError::Storage(format!(
                    "locking {}: {e}",
                    lock_path.display()
                )))
            }
        }

        let cache = if path.exists() {
            let content = Zeroizing::new(
                std::fs::read(path)
                    .map_err(|e| SbxError::Storage(format!("reading {}: {e}", path.display())))?,
            );
            serde_json::from_slice(&content)
                .map_err(|e| SbxError::Storage(format!("parsing {}: {e}", path.display())))?
        } else {
            CacheFile::default()
        };

        Ok(JsonStore {
            path: path.to_path_buf(),
            cache,
            _lock: lock,
        })
    }

    /// Atomic write: temp file, then rename over the store.
    fn flush(&self) -> SbxResult<()> {
        let json = Zeroizing::new(
            serde_json::to_vec_pretty(&self.cache)
                .map_err(|e| SbxError::Storage(format!("serializing local store: {e}")))?,
        );

        let tmp_path = self.path.with_extension("tmp");
        write_private(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| SbxError::Storage(format!("renaming {}: {e}", self.path.display())))
    }
}

impl LocalStore for JsonStore {
    fn put_user_key(&mut self, key: &UserKey) -> SbxResult<()> {
        self.cache.user_key.zeroize();
        self.cache.user_key = Some(key.to_base64().to_string());
        self.flush()
    }

    fn user_key(&self) -> SbxResult<Option<UserKey>> {
        match &self.cache.user_key {
            Some(encoded) => Ok(Some(UserKey::from_base64(encoded)?)),
            None => Ok(None),
        }
    }

    fn replace_records(&mut self, records: &[Record]) -> SbxResult<()> {
        self.cache.records = records.iter().map(|r| (r.id, r.clone())).collect();
        self.flush()
    }

    fn record(&self, id: i64) -> SbxResult<Option<Record>> {
        Ok(self.cache.records.get(&id).cloned())
    }

    fn records(&self) -> SbxResult<Vec<Record>> {
        let mut records: Vec<Record> = self.cache.records.values().cloned().collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn clear(&mut self) -> SbxResult<()> {
        self.cache.user_key.zeroize();
        self.cache.user_key = None;
        self.cache.records.clear();
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sbx_core::types::RecordType;

    fn record(id: i64, age_secs: i64) -> Record {
        let at = Utc::now() - Duration::seconds(age_secs);
        Record {
            id,
            user_id: 1,
            kind: RecordType::Text,
            metadata: format!("r{id}"),
            data: vec![id as u8; 40],
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(&dir.path().join("cache.json")).unwrap();
        assert!(store.user_key().unwrap().is_none());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let key = sbx_crypto::generate_user_key();

        {
            let mut store = JsonStore::open(&path).unwrap();
            store.put_user_key(&key).unwrap();
            store
                .replace_records(&[record(1, 30), record(2, 10)])
                .unwrap();
        }

        let store = JsonStore::open(&path).unwrap();
        assert_eq!(store.user_key().unwrap().unwrap().as_bytes(), key.as_bytes());
        let ids: Vec<i64> = store.records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.record(1).unwrap().unwrap().metadata, "r1");
        assert!(store.record(99).unwrap().is_none());
    }

    #[test]
    fn test_replace_is_not_a_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(&dir.path().join("cache.json")).unwrap();
        store.replace_records(&[record(1, 0), record(2, 0)]).unwrap();
        store.replace_records(&[record(3, 0)]).unwrap();

        let ids: Vec<i64> = store.records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_clear_removes_key_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut store = JsonStore::open(&path).unwrap();
        store.put_user_key(&sbx_crypto::generate_user_key()).unwrap();
        store.replace_records(&[record(1, 0)]).unwrap();
        store.clear().unwrap();

        assert!(store.user_key().unwrap().is_none());
        assert!(store.records().unwrap().is_empty());
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("user_key"));
    }

    #[test]
    fn test_second_open_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let _held = JsonStore::open(&path).unwrap();

        match JsonStore::open(&path) {
            Err(SbxError::Storage(msg)) => assert!(msg.contains("in use")),
            other => panic!("expected lock contention, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        drop(JsonStore::open(&path).unwrap());
        assert!(JsonStore::open(&path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut store = JsonStore::open(&path).unwrap();
        store.put_user_key(&sbx_crypto::generate_user_key()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonStore::open(&path), Err(SbxError::Storage(_))));
    }
}
