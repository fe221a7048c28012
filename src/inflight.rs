//! Registry of fingerprints with an outstanding network call.

use crate::fingerprint::Fingerprint;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// A mutex-guarded set of in-flight fingerprints.
///
/// [`try_begin`](Self::try_begin) is a single check-and-insert under the
/// lock, so two callers can never both be told to proceed.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    keys: Mutex<HashSet<Fingerprint>>,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `fingerprint` as in flight.
    ///
    /// Returns `true` if the caller may dispatch, `false` if a request with
    /// the same fingerprint is already outstanding.
    pub fn try_begin(&self, fingerprint: &Fingerprint) -> bool {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.insert(fingerprint.clone())
    }

    /// Clears `fingerprint`. Idempotent.
    pub fn end(&self, fingerprint: &Fingerprint) {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.remove(fingerprint);
    }

    /// Returns `true` if `fingerprint` is in flight.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(fingerprint)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Like [`try_begin`](Self::try_begin), but returns a guard that calls
    /// [`end`](Self::end) when dropped.
    pub fn acquire(self: &Arc<Self>, fingerprint: &Fingerprint) -> Option<InFlightGuard> {
        if self.try_begin(fingerprint) {
            Some(InFlightGuard {
                registry: Arc::clone(self),
                fingerprint: fingerprint.clone(),
            })
        } else {
            None
        }
    }
}

/// Holds a fingerprint slot until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    fingerprint: Fingerprint,
}

impl InFlightGuard {
    /// The fingerprint this guard holds.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.end(&self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RequestDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_second_begin_is_refused() {
        let registry = InFlightRegistry::new();
        let key = RequestDescriptor::get("/a").fingerprint();

        assert!(registry.try_begin(&key));
        assert!(!registry.try_begin(&key));

        registry.end(&key);
        registry.end(&key);
        assert!(registry.try_begin(&key));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = Arc::new(InFlightRegistry::new());
        let key = RequestDescriptor::get("/a").fingerprint();

        let guard = registry.acquire(&key).unwrap();
        assert!(registry.acquire(&key).is_none());
        assert!(registry.contains(guard.fingerprint()));

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_begin_admits_exactly_one() {
        let registry = Arc::new(InFlightRegistry::new());
        let key = RequestDescriptor::get("/race").fingerprint();
        let admitted = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let key = key.clone();
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if registry.try_begin(&key) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
