//! Defines the capabilities a cache group consumes from its surroundings.
//!
//! A group itself only orchestrates: the authoritative data source is a [Loader], and
//! the optional distribution layer is a pair of [PeerPicker] (which peer owns a key?)
//! and [PeerGetter] (fetch the value from that peer). All three are narrow traits so
//! that the core never depends on a concrete storage or transport - the
//! [http](crate::http) module provides the hyper based implementation of the peer side.
//!
//! Peer requests and responses are plain records with two logical fields
//! ([FetchRequest]) and one ([FetchResponse]); how they travel over the wire is entirely
//! the transport's concern.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Loads the authoritative value for a key.
///
/// The loader is invoked on a cache miss which no peer could satisfy. It is assumed to
/// be expensive (a database query, a computation) - which is exactly why cache groups
/// coalesce concurrent loads for the same key.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Produces the value for the given key or reports why it cannot.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain closure into a [Loader].
///
/// # Examples
/// ```
/// # use callisto::peers::{FnLoader, Loader};
/// # #[tokio::main]
/// # async fn main() {
/// let loader = FnLoader::new(|key: &str| Ok(key.to_uppercase().into_bytes()));
/// assert_eq!(loader.load("tom").await.unwrap(), b"TOM".to_vec());
/// # }
/// ```
pub struct FnLoader<F> {
    callback: F,
}

impl<F> FnLoader<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    /// Wraps the given closure.
    pub fn new(callback: F) -> Self {
        FnLoader { callback }
    }
}

#[async_trait]
impl<F> Loader for FnLoader<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.callback)(key)
    }
}

/// Describes a value being requested from a peer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchRequest {
    /// The name of the cache group which holds the key.
    pub group: String,

    /// The key being requested.
    pub key: String,
}

/// Carries the value bytes returned by a peer.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    /// The raw value as delivered by the peer.
    pub value: Bytes,
}

/// Fetches values from one specific remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Requests the given group/key combination from the peer.
    ///
    /// Note that a peer which simply doesn't have the value and a transport failure are
    /// both reported as a generic error - the caller treats them identically (by
    /// falling back to its local loader).
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResponse>;
}

/// Determines which peer owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the peer owning the given key or **None** if the key should be resolved
    /// locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}
