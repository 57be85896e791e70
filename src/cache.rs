//! Wraps the single-threaded eviction engine for concurrent use.
//!
//! A [GuardedCache] serializes all access to one [LruCache](crate::lru::LruCache) behind
//! a mutex. The inner cache is constructed lazily on the first write, so a freshly
//! created wrapper is valid (and reports misses) before any value has been stored.
//!
//! The lock is held for the duration of a single cache operation only - no I/O and no
//! awaiting ever happens while holding it, which is why a plain [std::sync::Mutex] is
//! the right tool here even within an async application.
use std::sync::Mutex;

use crate::lru::LruCache;
use crate::view::ByteView;

/// Provides a thread-safe, lazily initialized LRU cache for byte values.
pub struct GuardedCache {
    max_bytes: usize,
    inner: Mutex<Option<LruCache<ByteView>>>,
}

impl GuardedCache {
    /// Creates a new wrapper which will limit its cache to **max_bytes** bytes
    /// (0 = unlimited).
    ///
    /// Note that the underlying cache is only allocated once the first value is added.
    pub fn new(max_bytes: usize) -> Self {
        GuardedCache {
            max_bytes,
            inner: Mutex::new(None),
        }
    }

    /// Stores the given value for the given key.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .get_or_insert_with(|| LruCache::new(self.max_bytes))
            .add(key.to_owned(), value);
    }

    /// Returns the value stored for the given key or **None** if it is not present.
    ///
    /// If no value has ever been stored, this reports a miss without allocating the
    /// underlying cache.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.inner.lock().unwrap();
        match inner.as_mut() {
            Some(cache) => cache.get(key).cloned(),
            None => None,
        }
    }

    /// Returns the number of entries currently being cached.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.as_ref().map(LruCache::len).unwrap_or(0)
    }

    /// Determines if the cache is empty (or has never been written to).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
