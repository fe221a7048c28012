//! The response cache: raw response bytes keyed by fingerprint.

use crate::fingerprint::Fingerprint;
use crate::store::Store;
use bytes::Bytes;
use std::sync::Arc;

/// Best-effort cache over a [`Store`].
///
/// Caching is an optimization, so nothing here fails: a store error on
/// read is a miss and a store error on write is logged and dropped.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Store>,
}

impl ResponseCache {
    /// Wraps a store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the cached body for `fingerprint`, if any.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        match self.store.get(fingerprint.as_str()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, fingerprint = %fingerprint, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores `body` under `fingerprint`.
    pub fn set(&self, fingerprint: &Fingerprint, body: Bytes) {
        if let Err(e) = self.store.set(fingerprint.as_str(), body) {
            tracing::warn!(error = %e, fingerprint = %fingerprint, "Cache write failed");
        }
    }

    /// Removes the entry for `fingerprint`.
    pub fn remove(&self, fingerprint: &Fingerprint) {
        if let Err(e) = self.store.remove(fingerprint.as_str()) {
            tracing::warn!(error = %e, fingerprint = %fingerprint, "Cache remove failed");
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Cache clear failed");
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}
