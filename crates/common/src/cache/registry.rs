//! Uniform maintenance of several caches
//!
//! Services often own more than one cache (a row cache next to a sub-row
//! cache, textures next to icons). [`ExpiringCache`] erases the key and value
//! types so such caches can be swept, cleared and disposed together through
//! a [`CacheGroup`].

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::core::CacheCollection;
use crate::error::{CacheError, CacheResult};
use crate::time::Clock;

/// Type-erased maintenance interface implemented by every
/// [`CacheCollection`].
pub trait ExpiringCache: Send + Sync {
    /// Name the cache was configured with.
    fn cache_name(&self) -> &str;

    /// Evict every stale entry now. Returns how many were evicted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    fn handle_expired(&self) -> CacheResult<usize>;

    /// Remove every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    fn clear_entries(&self) -> CacheResult<usize>;

    /// Number of fresh entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    fn entry_count(&self) -> CacheResult<usize>;

    /// Dispose the cache. Idempotent.
    fn dispose(&self);

    /// Whether the cache has been disposed.
    fn is_disposed(&self) -> bool;
}

impl<K, V, C> ExpiringCache for CacheCollection<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock,
{
    fn cache_name(&self) -> &str {
        &self.options().name
    }

    fn handle_expired(&self) -> CacheResult<usize> {
        self.force_sweep()
    }

    fn clear_entries(&self) -> CacheResult<usize> {
        self.clear()
    }

    fn entry_count(&self) -> CacheResult<usize> {
        self.len()
    }

    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}

/// Named set of caches maintained together.
///
/// Operations snapshot the member list first and run without the group lock
/// held, so eviction hooks may register or unregister caches.
#[derive(Default)]
pub struct CacheGroup {
    caches: RwLock<BTreeMap<String, Arc<dyn ExpiringCache>>>,
}

impl fmt::Debug for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheGroup").field("caches", &self.names()).finish()
    }
}

impl CacheGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(self, name: impl Into<String>, cache: Arc<dyn ExpiringCache>) -> Self {
        self.register(name, cache);
        self
    }

    /// Add a cache under `name`, returning any cache previously registered
    /// under that name.
    pub fn register(
        &self,
        name: impl Into<String>,
        cache: Arc<dyn ExpiringCache>,
    ) -> Option<Arc<dyn ExpiringCache>> {
        let name = name.into();
        debug!(group_member = %name, cache = cache.cache_name(), "cache registered");
        self.caches.write().insert(name, cache)
    }

    /// Remove the cache registered under `name`. The cache is not disposed.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ExpiringCache>> {
        self.caches.write().remove(name)
    }

    /// Look up a member by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ExpiringCache>> {
        self.caches.read().get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Whether no caches are registered.
    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    fn members(&self) -> Vec<(String, Arc<dyn ExpiringCache>)> {
        self.caches.read().iter().map(|(name, cache)| (name.clone(), Arc::clone(cache))).collect()
    }

    fn for_each_live<F>(&self, operation: &str, mut apply: F) -> usize
    where
        F: FnMut(&dyn ExpiringCache) -> CacheResult<usize>,
    {
        let mut total = 0;
        for (name, cache) in self.members() {
            if cache.is_disposed() {
                continue;
            }
            match apply(cache.as_ref()) {
                Ok(count) => total += count,
                // Disposed between the check and the call.
                Err(CacheError::Disposed) => {}
                Err(err) => {
                    warn!(group_member = %name, operation, error = %err, "cache maintenance failed");
                }
            }
        }
        total
    }

    /// Sweep every live member. Returns the total number of evicted entries.
    pub fn sweep_all(&self) -> usize {
        let evicted = self.for_each_live("sweep", |cache| cache.handle_expired());
        info!(evicted, "cache group swept");
        evicted
    }

    /// Clear every live member. Returns the total number of removed entries.
    pub fn clear_all(&self) -> usize {
        let cleared = self.for_each_live("clear", |cache| cache.clear_entries());
        info!(cleared, "cache group cleared");
        cleared
    }

    /// Total fresh entries across live members.
    pub fn total_entries(&self) -> usize {
        self.for_each_live("count", |cache| cache.entry_count())
    }

    /// Dispose every member. Returns how many were live before the call.
    pub fn dispose_all(&self) -> usize {
        let mut disposed = 0;
        for (_, cache) in self.members() {
            if !cache.is_disposed() {
                cache.dispose();
                disposed += 1;
            }
        }
        info!(disposed, "cache group disposed");
        disposed
    }
}
