//! Provides the size constrained LRU eviction engine.
//!
//! A [LruCache] behaves just like a **Map** as long as there is no shortage in storage.
//! Once the bytes allocated by its entries exceed the configured limit, the least
//! recently used entries are evicted until the cache fits again.
//!
//! Note that the cache itself performs no locking at all and is therefore not safe for
//! concurrent use. Within a cache group it is exclusively owned and serialized by a
//! [GuardedCache](crate::cache::GuardedCache) - any other embedding has to provide the
//! same guarantee.
//!
//! # Examples
//! ```
//! # use callisto::lru::LruCache;
//! # use callisto::view::ByteView;
//! // Each entry is charged with key length + value length. With a limit of 16 bytes,
//! // two entries of 8 bytes each fit exactly...
//! let mut lru = LruCache::new(16);
//! lru.add("key1".to_owned(), ByteView::from("1234"));
//! lru.add("key2".to_owned(), ByteView::from("5678"));
//! assert_eq!(lru.len(), 2);
//!
//! // ...so adding a third entry evicts the least recently used one.
//! lru.add("key3".to_owned(), ByteView::from("9999"));
//! assert_eq!(lru.get("key1"), None);
//! assert_eq!(lru.len(), 2);
//! ```
use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of allocated memory in bytes.
    ///
    /// Note that most probably this is an approximation and not the exact byte value.
    /// However, it should represent the "largest" part of an instance. (E.g. for a
    /// string, this would be the bytes allocated on the heap.)
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

/// Observes entries being evicted from a [LruCache].
///
/// An observer is notified exactly once per evicted entry, with the exact key and value
/// removed. The "no observer" case is represented by not attaching one at all (see
/// [LruCache::with_observer]) rather than by a null check within the cache.
pub trait EvictionObserver<V> {
    /// Invoked after the given entry has been removed from the cache.
    fn entry_evicted(&mut self, key: &str, value: &V);
}

struct Entry<V> {
    mem_size: usize,
    value: V,
}

/// Provides a size constrained LRU cache.
///
/// The cache keeps its entries ordered by recency (both reads and writes promote an
/// entry) and charges each entry with **key length + value length** bytes. After every
/// insertion, least recently used entries are evicted until the total allocation fits
/// within **max_bytes** again. A **max_bytes** of **0** disables the limit entirely.
///
/// Note that a single entry which on its own exceeds **max_bytes** is admitted and then
/// immediately evicted again by the constraint loop - such an insert is a no-op apart
/// from notifying the eviction observer.
pub struct LruCache<V: ByteSize> {
    max_bytes: usize,
    current_bytes: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    map: LinkedHashMap<String, Entry<V>>,
    observer: Option<Box<dyn EvictionObserver<V> + Send>>,
}

impl<V: ByteSize> LruCache<V> {
    /// Creates a new cache which evicts entries once more than **max_bytes** bytes are
    /// allocated (0 = unlimited).
    pub fn new(max_bytes: usize) -> Self {
        LruCache {
            max_bytes,
            current_bytes: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            map: LinkedHashMap::new(),
            observer: None,
        }
    }

    /// Creates a new cache which reports each evicted entry to the given observer.
    pub fn with_observer(max_bytes: usize, observer: Box<dyn EvictionObserver<V> + Send>) -> Self {
        LruCache {
            observer: Some(observer),
            ..LruCache::new(max_bytes)
        }
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry is promoted to
    /// the most recently used position. Afterwards, least recently used entries are
    /// evicted until the cache fits within its size limit again.
    pub fn add(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        let mut delta_mem = entry.mem_size as isize;
        if let Some(stale_entry) = self.map.insert(key, entry) {
            delta_mem -= stale_entry.mem_size as isize;
        }

        self.writes += 1;
        self.current_bytes = (self.current_bytes as isize + delta_mem) as usize;

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_bytes != 0 && self.current_bytes > self.max_bytes {
            let _ = self.remove_oldest();
        }
    }

    /// Returns the value which has previously been stored for the given key or **None**
    /// if no value is present.
    ///
    /// Note that even a pure read promotes the entry to the most recently used position.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Removes and returns the least recently used entry, if any exists.
    ///
    /// The eviction observer (if attached) is notified with the removed key and value.
    /// On an empty cache this is a no-op.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        match self.map.pop_front() {
            Some((key, entry)) => {
                self.current_bytes -= entry.mem_size;
                if let Some(observer) = self.observer.as_mut() {
                    observer.entry_evicted(&key, &entry.value);
                }
                Some((key, entry.value))
            }
            None => None,
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of bytes currently charged against the size limit.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Returns the size limit in bytes (0 = unlimited).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the total number of writes performed on this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EvictionObserver, LruCache};
    use crate::view::ByteView;
    use std::sync::{Arc, Mutex};

    struct RecordingObserver {
        evictions: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl EvictionObserver<ByteView> for RecordingObserver {
        fn entry_evicted(&mut self, key: &str, value: &ByteView) {
            self.evictions
                .lock()
                .unwrap()
                .push((key.to_owned(), value.to_string()));
        }
    }

    #[test]
    fn byte_accounting_matches_contents() {
        let mut lru = LruCache::new(0);

        // "A" + "1234" charges 5 bytes, "BB" + "56" charges 4...
        lru.add("A".to_owned(), ByteView::from("1234"));
        lru.add("BB".to_owned(), ByteView::from("56"));
        assert_eq!(lru.current_bytes(), 9);
        assert_eq!(lru.len(), 2);

        // Replacing a value adjusts the accounting by the size difference...
        lru.add("A".to_owned(), ByteView::from("12"));
        assert_eq!(lru.current_bytes(), 7);
        assert_eq!(lru.len(), 2);

        // ...and removal releases key + value bytes.
        let (key, value) = lru.remove_oldest().unwrap();
        assert_eq!(lru.current_bytes(), 7 - key.len() - value.len());
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn size_limit_is_enforced_after_every_add() {
        // Each entry below charges 4 bytes, so 3 entries fit into 12...
        let mut lru = LruCache::new(12);
        lru.add("A".to_owned(), ByteView::from("aaa"));
        lru.add("B".to_owned(), ByteView::from("bbb"));
        lru.add("C".to_owned(), ByteView::from("ccc"));
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.current_bytes(), 12);

        // ...and a fourth one pushes the least recently used entry out.
        lru.add("D".to_owned(), ByteView::from("ddd"));
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.current_bytes(), 12);
        assert_eq!(lru.get("A"), None);
    }

    #[test]
    fn reads_promote_entries() {
        let mut lru = LruCache::new(12);
        lru.add("A".to_owned(), ByteView::from("aaa"));
        lru.add("B".to_owned(), ByteView::from("bbb"));
        lru.add("C".to_owned(), ByteView::from("ccc"));

        // Touching "A" makes "B" the least recently used entry...
        assert_eq!(lru.get("A"), Some(&ByteView::from("aaa")));

        // ...so the next insert evicts "B", not "A".
        lru.add("D".to_owned(), ByteView::from("ddd"));
        assert_eq!(lru.get("B"), None);
        assert_eq!(lru.get("A"), Some(&ByteView::from("aaa")));
        assert_eq!(lru.get("C"), Some(&ByteView::from("ccc")));
        assert_eq!(lru.get("D"), Some(&ByteView::from("ddd")));
    }

    #[test]
    fn oversized_entries_evict_themselves() {
        let mut lru = LruCache::new(8);
        lru.add("huge".to_owned(), ByteView::from("way too large to fit"));

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.current_bytes(), 0);
        assert_eq!(lru.get("huge"), None);
    }

    #[test]
    fn observer_sees_each_eviction_exactly_once() {
        let evictions = Arc::new(Mutex::new(Vec::new()));
        let observer = RecordingObserver {
            evictions: evictions.clone(),
        };

        let mut lru = LruCache::with_observer(12, Box::new(observer));
        lru.add("A".to_owned(), ByteView::from("aaa"));
        lru.add("B".to_owned(), ByteView::from("bbb"));
        lru.add("C".to_owned(), ByteView::from("ccc"));
        lru.add("D".to_owned(), ByteView::from("ddd"));
        lru.add("E".to_owned(), ByteView::from("eee"));

        let seen = evictions.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("A".to_owned(), "aaa".to_owned()),
                ("B".to_owned(), "bbb".to_owned())
            ]
        );
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LruCache::new(0);
        lru.add("A".to_owned(), ByteView::from("a"));
        lru.add("B".to_owned(), ByteView::from("b"));

        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_none(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 2);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 50);
    }
}
