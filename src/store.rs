//! Key-value stores backing the response cache.
//!
//! A [`Store`] may fail; the [`ResponseCache`](crate::cache::ResponseCache)
//! wrapper reduces every failure to a miss or a no-op. Eviction and expiry
//! are the store's business.

use crate::{Error, Result};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A keyed byte store.
///
/// Implementations must be safe to call from several in-flight requests
/// at once.
pub trait Store: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Removes the value under `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Removes every value.
    fn clear(&self) -> Result<()>;
}

/// An in-process store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// A directory-backed store, one file per key.
///
/// File names are the SHA-256 hex digest of the key, so arbitrary
/// fingerprints map to safe paths. Writes go to a temporary file first and
/// are renamed into place.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| store_error(&dir, e))?;
        Ok(Self { dir })
    }

    /// The directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(name)
    }
}

impl Store for DiskStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error(&path, e)),
        }
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &value).map_err(|e| store_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| store_error(&path, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error(&path, e)),
        }
    }

    fn clear(&self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| store_error(&self.dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| store_error(&self.dir, e))?.path();
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| store_error(&path, e))?;
            }
        }
        Ok(())
    }
}

fn store_error(path: &Path, e: std::io::Error) -> Error {
    Error::Store(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.set("k", Bytes::from_static(b"v1")).unwrap();
        store.set("k", Bytes::from_static(b"v2")).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Bytes::from_static(b"v2")));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_disk_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let key = "GET /users {\"page\":1}";

        let store = DiskStore::open(dir.path()).unwrap();
        store.set(key, Bytes::from_static(b"{\"code\":0}")).unwrap();

        let reopened = DiskStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get(key).unwrap(),
            Some(Bytes::from_static(b"{\"code\":0}"))
        );

        reopened.clear().unwrap();
        assert!(store.get(key).unwrap().is_none());
        store.remove(key).unwrap();
    }
}
