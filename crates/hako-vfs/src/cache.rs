//! Single-flight async memoization.
//!
//! [`AsyncCache`] binds each key to one shared future the first time the key
//! is seen. Every caller for that key, concurrent or later, awaits the same
//! future and observes the same value or the same failure. Entries are never
//! evicted or rebound.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;

/// Failure replayed to every waiter of a key.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The generator returned an error.
    #[error("cache generator failed: {0}")]
    Failed(Arc<dyn StdError + Send + Sync>),

    /// The generator task panicked or was cancelled.
    #[error("cache generator aborted: {0}")]
    Aborted(String),
}

impl CacheError {
    /// Borrow the generator's error as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            CacheError::Failed(e) => e.downcast_ref::<E>(),
            CacheError::Aborted(_) => None,
        }
    }
}

type Slot<T> = Shared<BoxFuture<'static, Result<T, CacheError>>>;

/// Key → future memoizer with at-most-once generation per key.
///
/// Owned by whoever constructs it and passed by reference to call sites;
/// there is no global instance.
pub struct AsyncCache<T> {
    slots: Mutex<IndexMap<String, Slot<T>>>,
}

impl<T> std::fmt::Debug for AsyncCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCache")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for AsyncCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(IndexMap::new()),
        }
    }

    /// Get the value for `key`, running `generator` only if the key is unbound.
    ///
    /// On a miss the generator is spawned on the tokio runtime and its
    /// future is bound to `key` inside the same critical section as the
    /// lookup, so two racing callers can never both start it. Generator
    /// errors are cached and replayed; there is no retry.
    pub async fn invoke<F, Fut, E>(&self, key: impl Into<String>, generator: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let slot = {
            let mut slots = self.slots.lock();
            let key = key.into();
            match slots.get(&key) {
                Some(slot) => slot.clone(),
                None => {
                    tracing::debug!(key = %key, "async cache miss, spawning generator");
                    let handle = tokio::spawn(generator());
                    let slot = async move {
                        match handle.await {
                            Ok(Ok(value)) => Ok(value),
                            Ok(Err(e)) => Err(CacheError::Failed(Arc::new(e))),
                            Err(join) => Err(CacheError::Aborted(join.to_string())),
                        }
                    }
                    .boxed()
                    .shared();
                    slots.insert(key, slot.clone());
                    slot
                }
            }
        };

        slot.await
    }

    /// Returns true if `key` has been bound (pending or complete).
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Bound keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.slots.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::VfsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_flight() {
        let cache: Arc<AsyncCache<String>> = Arc::new(AsyncCache::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let callers = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                cache
                    .invoke("config", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, VfsError>("loaded".to_string())
                    })
                    .await
            })
        });

        let results = futures::future::join_all(callers).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "loaded");
        }
    }

    #[tokio::test]
    async fn test_later_callers_reuse_value() {
        let cache = AsyncCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            let value = cache
                .invoke("k", move || async move {
                    Ok::<_, VfsError>(runs.fetch_add(1, Ordering::SeqCst))
                })
                .await
                .unwrap();
            assert_eq!(value, 0);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_replayed() {
        let cache: AsyncCache<u32> = AsyncCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let runs = Arc::clone(&runs);
            cache
                .invoke("missing", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(VfsError::not_found("missing.txt"))
                })
                .await
                .unwrap_err()
        };

        let second = {
            let runs = Arc::clone(&runs);
            cache
                .invoke("missing", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, VfsError>(1)
                })
                .await
                .unwrap_err()
        };

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(matches!(
            second.downcast_ref::<VfsError>(),
            Some(VfsError::NotFound(p)) if p == "missing.txt"
        ));
        match (&first, &second) {
            (CacheError::Failed(a), CacheError::Failed(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("expected replayed failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_generator_is_aborted() {
        let cache: AsyncCache<u32> = AsyncCache::new();
        let result = cache
            .invoke("boom", || async {
                if true {
                    panic!("generator exploded");
                }
                Ok::<u32, VfsError>(0)
            })
            .await;
        assert!(matches!(result, Err(CacheError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_keys_keep_insertion_order() {
        let cache = AsyncCache::new();
        for key in ["b", "a", "c"] {
            cache
                .invoke(key, move || async move { Ok::<_, VfsError>(key.len()) })
                .await
                .unwrap();
        }
        assert_eq!(cache.keys(), vec!["b", "a", "c"]);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains_key("a"));
        assert!(!cache.contains_key("z"));
    }
}
