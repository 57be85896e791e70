//! Provides the process wide directory of named cache groups.
//!
//! A [GroupRegistry] maps group names to their [CacheGroup] instances. Groups are
//! created exactly once via [GroupRegistry::create_group] and can then be looked up by
//! name - a lookup never constructs a group implicitly. As lookups vastly outnumber
//! registrations, the internal map is guarded by a reader-preferring lock.
//!
//! Note that the registry is an explicit object rather than ambient global state: the
//! embedding application creates one at startup and passes it to whatever needs to
//! resolve groups (e.g. the [HTTP peer endpoint](crate::http)).
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
//! let group = registry
//!     .create_group("scores", 2 << 10, Arc::new(FnLoader::new(|key: &str| {
//!         Ok(format!("score-of-{}", key).into_bytes())
//!     })))
//!     .unwrap();
//!
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "score-of-Tom");
//!
//! // The group can now be resolved by name...
//! assert_eq!(registry.lookup("scores").is_some(), true);
//! // ...but unknown names simply yield None.
//! assert_eq!(registry.lookup("ratings").is_none(), true);
//! # }
//! ```
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::group::CacheGroup;
use crate::peers::Loader;

/// Keeps all named cache groups of a process in a single place.
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<CacheGroup>>>,
}

impl GroupRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(GroupRegistry {
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a group with the given name, cache size (in bytes, 0 = unlimited) and
    /// loader, and registers it under its name.
    ///
    /// Group names are unique: attempting to register a second group under an existing
    /// name indicates a wiring error and is reported as such.
    pub fn create_group(
        &self,
        name: &str,
        cache_bytes: usize,
        loader: Arc<dyn Loader>,
    ) -> anyhow::Result<Arc<CacheGroup>> {
        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(name) {
            return Err(anyhow::anyhow!(
                "A cache group named '{}' has already been registered!",
                name
            ));
        }

        let group = Arc::new(CacheGroup::new(name, cache_bytes, loader));
        let _ = groups.insert(name.to_owned(), group.clone());

        Ok(group)
    }

    /// Returns the group registered under the given name, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<CacheGroup>> {
        self.groups.read().unwrap().get(name).cloned()
    }
}
