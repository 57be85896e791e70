//! Callisto is a library for building distributed read-through caches.
//!
//! # Introduction
//! A **Callisto** cache is organized in named **groups**. Asking a group for a key
//! either returns the value from its in-process LRU cache or resolves it through a
//! single authoritative **loader** - with two twists which make the whole thing scale:
//!
//! * **Single-flight loading**: any number of concurrent misses for the same key are
//!   collapsed into exactly one loader invocation whose outcome is shared by all
//!   callers. A cache which lets a thundering herd through to the backend on every
//!   miss isn't much of a cache.
//! * **Peer routing**: a group can be wired into a cluster via consistent hashing, so
//!   that every key has exactly one owning node. Misses for keys owned by another node
//!   are fetched from that peer (which caches them) instead of being loaded redundantly
//!   on every node.
//!
//! The core only depends on narrow capabilities ([Loader](peers::Loader),
//! [PeerPicker](peers::PeerPicker), [PeerGetter](peers::PeerGetter)); the bundled
//! [http] module implements the peer side of these on top of
//! [hyper](https://hyper.rs), and everything else is left to the embedding application.
//!
//! # Modules
//! * **view**: the immutable byte payload handed to callers ([view::ByteView]).
//! * **lru**: the size constrained LRU eviction engine ([lru::LruCache]).
//! * **cache**: the thread-safe, lazily initialized wrapper around it.
//! * **ring**: the consistent hashing ring used for peer routing ([ring::HashRing]).
//! * **coalesce**: the single-flight primitive ([coalesce::CallCoalescer]).
//! * **group**: the orchestrating cache group ([group::CacheGroup]).
//! * **registry**: the named group directory ([registry::GroupRegistry]).
//! * **http**: the hyper based peer transport ([http::HttpPeerPool]).
//!
//! # Examples
//! ```
//! # use std::sync::Arc;
//! # use callisto::peers::FnLoader;
//! # use callisto::registry::GroupRegistry;
//! # #[tokio::main]
//! # async fn main() {
//! let registry = GroupRegistry::new();
//!
//! // Create a group backed by a (deliberately simple) loader...
//! let group = registry
//!     .create_group("scores", 2 << 10, Arc::new(FnLoader::new(|key: &str| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} not exist", key)),
//!     })))
//!     .unwrap();
//!
//! // The first lookup invokes the loader, the second one is served from the cache...
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! # }
//! ```
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod cache;
pub mod coalesce;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod registry;
pub mod ring;
pub mod view;

/// Contains the version of the Callisto library.
pub const CALLISTO_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Initializes the logging system.
///
/// This installs a [simplelog](https://docs.rs/simplelog) based logger. An embedding
/// application with its own logging setup can simply skip this call - the library only
/// logs via the [log](https://docs.rs/log) facade.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise integration tests might crash as the logging
    // system is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}
