//! Provides the consistent hashing ring used to route keys to peer nodes.
//!
//! A [HashRing] maps arbitrary keys to one of a set of registered node identifiers. Each
//! node is represented by a number of virtual replicas on the ring to smooth the load
//! distribution. A key is owned by the node whose (replica) position is the smallest one
//! greater than or equal to the key's hash - the ring is circular, so a hash beyond the
//! largest position wraps around to the smallest one.
//!
//! The main property of consistent hashing is that adding or removing a node only remaps
//! the keys adjacent to its positions instead of reshuffling the whole key space.
//!
//! # Examples
//! ```
//! # use callisto::ring::HashRing;
//! let mut ring = HashRing::new(1, Box::new(|key| key.len() as u32));
//! ring.add(["alpha"]);
//!
//! assert_eq!(ring.get("some-key"), Some("alpha"));
//! ```
use std::collections::HashMap;
use std::hash::Hasher;

use fnv::FnvHasher;

/// Maps a key to an unsigned 32-bit position on the ring.
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Provides a consistent hashing ring with virtual replicas.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    positions: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a new ring which places **replicas** virtual positions per node, using
    /// the given hash function.
    ///
    /// # Panics
    /// Panics if **replicas** is zero, as such a ring could never own anything.
    pub fn new(replicas: usize, hash: HashFn) -> Self {
        assert!(replicas > 0, "A hash ring requires at least one replica per node!");

        HashRing {
            replicas,
            hash,
            positions: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Creates a new ring using FNV-1a (truncated to 32 bits) as its hash function.
    pub fn with_default_hash(replicas: usize) -> Self {
        HashRing::new(
            replicas,
            Box::new(|key| {
                let mut hasher = FnvHasher::default();
                hasher.write(key);
                hasher.finish() as u32
            }),
        )
    }

    /// Registers the given nodes on the ring.
    ///
    /// For each node, one position per replica is derived by hashing the replica index
    /// concatenated with the node identifier. The ring is re-sorted once per batch.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", replica, node).as_bytes());
                self.positions.push(position);
                let _ = self.owners.insert(position, node.to_owned());
            }
        }

        self.positions.sort_unstable();
    }

    /// Returns the node owning the given key or **None** if the ring is empty.
    ///
    /// A key whose hash exactly matches a ring position is owned by that position's
    /// node.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());

        // Find the first position >= hash, wrapping around to the smallest position if
        // the hash is beyond the end of the ring...
        let index = self.positions.partition_point(|&position| position < hash);
        let position = self.positions[index % self.positions.len()];

        self.owners.get(&position).map(String::as_str)
    }

    /// Determines if no nodes have been registered yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
