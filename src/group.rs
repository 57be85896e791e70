//! Provides the cache group which orchestrates the miss resolution pipeline.
//!
//! A [CacheGroup] is a named cache namespace. Looking up a key first consults the local
//! LRU cache. On a miss, the load is funneled through a
//! [CallCoalescer](crate::coalesce::CallCoalescer) so that any number of concurrent
//! misses for the same key result in exactly one expensive resolution. That resolution
//! first asks the registered [PeerPicker] (if any) whether a remote peer owns the key
//! and fetches from there; on peer absence or failure it falls back to the local
//! [Loader], whose result is stored in the cache.
//!
//! Note that values fetched from a peer are *not* written into the local cache - the
//! owning peer is the node caching them. Repeated lookups for peer-owned keys therefore
//! always cost a network round trip. Also, no timeout is imposed on the loader or on
//! peer fetches: a hung collaborator blocks all callers coalesced onto that key.
//!
//! Groups are created via [GroupRegistry::create_group](crate::registry::GroupRegistry::create_group).
use std::sync::{Arc, OnceLock};

use crate::cache::GuardedCache;
use crate::coalesce::CallCoalescer;
use crate::peers::{FetchRequest, Loader, PeerGetter, PeerPicker};
use crate::view::ByteView;

/// A named cache namespace with its own loader, storage and optional peer topology.
pub struct CacheGroup {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: GuardedCache,
    coalescer: CallCoalescer<ByteView>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
}

impl CacheGroup {
    pub(crate) fn new(name: &str, cache_bytes: usize, loader: Arc<dyn Loader>) -> Self {
        CacheGroup {
            name: name.to_owned(),
            loader,
            main_cache: GuardedCache::new(cache_bytes),
            coalescer: CallCoalescer::new(),
            peers: OnceLock::new(),
        }
    }

    /// Returns the name under which this group has been registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the peer routing capability to this group.
    ///
    /// The peer topology is fixed at setup: calling this a second time indicates a
    /// wiring error and is reported as such.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> anyhow::Result<()> {
        self.peers.set(peers).map_err(|_| {
            anyhow::anyhow!(
                "Peers have already been registered for cache group '{}'!",
                self.name
            )
        })
    }

    /// Returns the value for the given key.
    ///
    /// A cached value is returned immediately. Otherwise the value is resolved via the
    /// owning peer (if one is registered and selected) or the local loader, with
    /// concurrent resolutions for the same key collapsed into one.
    pub async fn get(&self, key: &str) -> anyhow::Result<ByteView> {
        if key.is_empty() {
            return Err(anyhow::anyhow!(
                "An empty key cannot be looked up in cache group '{}'.",
                self.name
            ));
        }

        if let Some(value) = self.main_cache.get(key) {
            log::debug!("Cache hit for '{}' in group '{}'...", key, self.name);
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> anyhow::Result<ByteView> {
        self.coalescer
            .run(key, self.resolve(key))
            .await
            .map_err(|error| anyhow::anyhow!(error))
    }

    async fn resolve(&self, key: &str) -> anyhow::Result<ByteView> {
        if let Some(peers) = self.peers.get() {
            if let Some(peer) = peers.pick_peer(key) {
                match self.fetch_from_peer(peer.as_ref(), key).await {
                    Ok(value) => return Ok(value),
                    Err(error) => log::warn!(
                        "Failed to fetch '{}' from a peer of group '{}': {:#}. \
                         Falling back to the local loader...",
                        key,
                        self.name,
                        error
                    ),
                }
            }
        }

        self.resolve_locally(key).await
    }

    async fn resolve_locally(&self, key: &str) -> anyhow::Result<ByteView> {
        let bytes = self.loader.load(key).await?;
        let value = ByteView::from(bytes);
        self.populate_cache(key, value.clone());

        Ok(value)
    }

    async fn fetch_from_peer(
        &self,
        peer: &dyn PeerGetter,
        key: &str,
    ) -> anyhow::Result<ByteView> {
        let request = FetchRequest {
            group: self.name.clone(),
            key: key.to_owned(),
        };
        let response = peer.fetch(&request).await?;

        // The owning peer caches this value, we don't...
        Ok(ByteView::from(response.value))
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }
}
