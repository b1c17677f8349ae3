//! Local cache of sealed records and the unwrapped user key
//!
//! Two backends are available:
//!   - **JSON** (default): one file, loaded into memory and rewritten atomically
//!     via temp+rename on every change.
//!   - **RocksDB** (behind the `rocksdb` feature): column families `records` and `keys`.
//!
//! Both implement [`LocalStore`], so [`ClientVault`](crate::ClientVault) uses
//! either transparently. Both hold an exclusive lock for the lifetime of the
//! handle: a second client opening the same directory gets a storage error.
//!
//! Records are kept exactly as the server returned them (sealed). Plaintext
//! never reaches this layer.

pub mod json;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use sbx_core::config::StoreBackendKind;
use sbx_core::types::Record;
use sbx_core::{SbxError, SbxResult};
use sbx_crypto::UserKey;
use std::path::Path;

pub use json::JsonStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// File name of the JSON store inside the data directory.
pub const JSON_FILE: &str = "cache.json";
/// Directory name of the RocksDB store inside the data directory.
pub const ROCKS_DIR: &str = "cache.rocksdb";

pub trait LocalStore {
    /// Store the unwrapped user key, replacing any previous one.
    fn put_user_key(&mut self, key: &UserKey) -> SbxResult<()>;
    fn user_key(&self) -> SbxResult<Option<UserKey>>;
    /// Replace the whole record collection (no merge).
    fn replace_records(&mut self, records: &[Record]) -> SbxResult<()>;
    fn record(&self, id: i64) -> SbxResult<Option<Record>>;
    /// All cached records, newest first.
    fn records(&self) -> SbxResult<Vec<Record>>;
    /// Drop both the key and every record.
    fn clear(&mut self) -> SbxResult<()>;
}

/// Dispatch enum over the compiled-in backends, selected by config.
pub enum StoreBackend {
    Json(JsonStore),
    #[cfg(feature = "rocksdb")]
    Rocks(RocksStore),
}

impl StoreBackend {
    /// Open (creating if needed) the configured backend under `dir`.
    pub fn open(dir: &Path, kind: StoreBackendKind) -> SbxResult<Self> {
        match kind {
            StoreBackendKind::Json => Ok(StoreBackend::Json(JsonStore::open(&dir.join(JSON_FILE))?)),
            #[cfg(feature = "rocksdb")]
            StoreBackendKind::Rocksdb => {
                Ok(StoreBackend::Rocks(RocksStore::open(&dir.join(ROCKS_DIR))?))
            }
            #[cfg(not(feature = "rocksdb"))]
            StoreBackendKind::Rocksdb => Err(SbxError::Config(
                "store_backend = \"rocksdb\" needs sbx-client built with the `rocksdb` feature"
                    .into(),
            )),
        }
    }

    fn inner(&self) -> &dyn LocalStore {
        match self {
            StoreBackend::Json(s) => s,
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LocalStore {
        match self {
            StoreBackend::Json(s) => s,
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s,
        }
    }
}

impl LocalStore for StoreBackend {
    fn put_user_key(&mut self, key: &UserKey) -> SbxResult<()> {
        self.inner_mut().put_user_key(key)
    }
    fn user_key(&self) -> SbxResult<Option<UserKey>> {
        self.inner().user_key()
    }
    fn replace_records(&mut self, records: &[Record]) -> SbxResult<()> {
        self.inner_mut().replace_records(records)
    }
    fn record(&self, id: i64) -> SbxResult<Option<Record>> {
        self.inner().record(id)
    }
    fn records(&self) -> SbxResult<Vec<Record>> {
        self.inner().records()
    }
    fn clear(&mut self) -> SbxResult<()> {
        self.inner_mut().clear()
    }
}

/// Newest first, ties broken by id, matching the server's listing order.
pub(crate) fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Write `bytes` to `path`, creating the file owner-read/write only.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> SbxResult<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|e| SbxError::Storage(format!("opening {}: {e}", path.display())))?;
    // mode() only applies on creation
    restrict_permissions(path)?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| SbxError::Storage(format!("writing {}: {e}", path.display())))
}

/// Owner-only permissions on a file holding secrets.
#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) -> SbxResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        SbxError::Storage(format!("setting permissions on {}: {e}", path.display()))
    })
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path) -> SbxResult<()> {
    Ok(())
}
