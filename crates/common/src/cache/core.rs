//! Expiring cache collection
//!
//! [`CacheCollection`] keeps key/value pairs together with their access and
//! update times, evicts entries that overrun the sliding or absolute window,
//! and hands every evicted pair to the configured hook exactly once.

use std::collections::hash_map::Entry as Slot;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, instrument, trace};

use super::config::CacheOptions;
use super::entry::{Entry, Eviction, EvictionReason, ExpiryPolicy};
use super::stats::{CacheStats, MetricsCollector};
use crate::error::{CacheError, CacheResult, GetOrAddError};
use crate::time::{Clock, RecurringTimer, SystemClock};

type EntryMap<K, V> = HashMap<K, Entry<V>>;

/// State shared between the collection and its sweep thread.
struct CacheCore<K, V, C> {
    entries: Mutex<EntryMap<K, V>>,
    policy: ExpiryPolicy,
    options: CacheOptions<K, V>,
    metrics: MetricsCollector,
    disposed: AtomicBool,
    clock: C,
}

impl<K, V, C> CacheCore<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    fn new(options: CacheOptions<K, V>, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy: ExpiryPolicy::new(options.sliding_expiry, options.absolute_expiry),
            options,
            metrics: MetricsCollector::new(),
            disposed: AtomicBool::new(false),
            clock,
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Lock the map, failing if the cache was disposed.
    ///
    /// The flag is read under the lock: a writer racing `dispose` either
    /// lands before the drain or sees the flag.
    fn lock_live(&self) -> CacheResult<MutexGuard<'_, EntryMap<K, V>>> {
        let entries = self.entries.lock();
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(entries)
    }

    fn take_if_stale(
        &self,
        entries: &mut EntryMap<K, V>,
        key: &K,
        now: Instant,
    ) -> Option<Eviction<K, V>> {
        let kind = self.policy.staleness(entries.get(key)?, now)?;
        let (key, entry) = entries.remove_entry(key)?;
        Some(Eviction { key, value: entry.value, reason: EvictionReason::Expired(kind) })
    }

    fn drain_all(entries: &mut EntryMap<K, V>, reason: EvictionReason) -> Vec<Eviction<K, V>> {
        entries.drain().map(|(key, entry)| Eviction { key, value: entry.value, reason }).collect()
    }

    fn lookup(&self, key: &K) -> CacheResult<Option<V>> {
        let mut entries = self.lock_live()?;
        let now = self.clock.now();

        if let Some(expired) = self.take_if_stale(&mut entries, key, now) {
            drop(entries);
            self.metrics.record_lookup(false);
            self.dispatch(Some(expired));
            return Ok(None);
        }

        let value = entries.get_mut(key).map(|entry| {
            entry.touch(now);
            entry.value.clone()
        });
        drop(entries);

        self.metrics.record_lookup(value.is_some());
        Ok(value)
    }

    /// Store `value` unless a fresh entry appeared meanwhile, in which case
    /// the stored value wins and `value` is dropped without the hook.
    fn insert_if_vacant(&self, key: K, value: V) -> CacheResult<V> {
        let mut entries = self.lock_live()?;
        let now = self.clock.now();
        let expired = self.take_if_stale(&mut entries, &key, now);

        let (stored, discarded) = match entries.entry(key) {
            Slot::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.touch(now);
                (existing.value.clone(), Some(value))
            }
            Slot::Vacant(slot) => {
                slot.insert(Entry::new(value.clone(), now));
                self.metrics.record_write(false);
                (value, None)
            }
        };
        drop(entries);

        if discarded.is_some() {
            trace!(cache = %self.options.name, "concurrent producer lost the insert race");
        }
        drop(discarded);
        self.dispatch(expired);
        Ok(stored)
    }

    /// One pass over the map, evicting whatever is stale right now.
    #[instrument(level = "trace", skip(self), fields(cache = %self.options.name))]
    fn sweep(&self) -> usize {
        let expired: Vec<Eviction<K, V>> = {
            let mut entries = self.entries.lock();
            if self.is_disposed() {
                return 0;
            }
            let now = self.clock.now();
            let stale: Vec<K> = entries
                .iter()
                .filter(|(_, entry)| self.policy.is_stale(*entry, now))
                .map(|(key, _)| key.clone())
                .collect();
            stale.iter().filter_map(|key| self.take_if_stale(&mut entries, key, now)).collect()
        };

        self.metrics.record_sweep();
        let evicted = expired.len();
        if evicted > 0 {
            debug!(cache = %self.options.name, evicted, "sweep evicted stale entries");
        }
        self.dispatch(expired);
        evicted
    }

    /// Run the hook for entries already removed from the map.
    ///
    /// Must be called without the map lock held.
    fn dispatch<I>(&self, evictions: I)
    where
        I: IntoIterator<Item = Eviction<K, V>>,
    {
        for Eviction { key, value, reason } in evictions {
            self.metrics.record_eviction(reason);
            trace!(cache = %self.options.name, %reason, "entry left cache");

            let Some(hook) = &self.options.on_expiry else {
                continue;
            };
            if panic::catch_unwind(AssertUnwindSafe(|| hook(key, value))).is_err() {
                error!(
                    cache = %self.options.name,
                    %reason,
                    "eviction hook panicked; continuing with remaining entries"
                );
            }
        }
    }
}

/// Thread-safe key/value cache with sliding and absolute expiry.
///
/// Entries are evicted when read after going stale, by a background sweep
/// every `expire_interval` (when enabled), by [`force_sweep`], and by
/// explicit [`remove`] / [`clear`] / [`dispose`]. The eviction hook runs
/// once per evicted entry, outside the internal lock.
///
/// After [`dispose`] every operation returns [`CacheError::Disposed`].
/// Dropping the collection disposes it.
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`); wrap expensive resources in `Arc`
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use sirensong_common::cache::{CacheCollection, CacheOptions};
///
/// let icons: CacheCollection<u32, String> =
///     CacheCollection::new(CacheOptions::sliding(Duration::from_secs(300)))?;
///
/// let icon = icons.get_or_add(60_001, |id| format!("ui/icon/{id}.tex"))?;
/// assert_eq!(icon, "ui/icon/60001.tex");
/// assert_eq!(icons.get(&60_001)?, Some(icon));
/// # Ok::<(), sirensong_common::error::CacheError>(())
/// ```
///
/// [`force_sweep`]: Self::force_sweep
/// [`remove`]: Self::remove
/// [`clear`]: Self::clear
/// [`dispose`]: Self::dispose
pub struct CacheCollection<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock,
{
    core: Arc<CacheCore<K, V, C>>,
    sweeper: Mutex<Option<RecurringTimer>>,
}

impl<K, V> CacheCollection<K, V, SystemClock>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a new cache with the given options using the system clock
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for invalid options and
    /// [`CacheError::Timer`] if the sweep thread cannot be started.
    pub fn new(options: CacheOptions<K, V>) -> CacheResult<Self> {
        Self::with_clock(options, SystemClock)
    }

    /// Create a cache with the default options: one hour absolute expiry,
    /// swept every minute.
    ///
    /// # Errors
    ///
    /// See [`CacheCollection::new`].
    pub fn with_defaults() -> CacheResult<Self> {
        Self::new(CacheOptions::default())
    }
}

impl<K, V, C> CacheCollection<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock,
{
    /// Create a new cache with a custom clock (useful for testing)
    ///
    /// # Errors
    ///
    /// See [`CacheCollection::new`].
    pub fn with_clock(options: CacheOptions<K, V>, clock: C) -> CacheResult<Self> {
        options.validate()?;

        let core = Arc::new(CacheCore::new(options, clock));
        let sweeper =
            if core.options.runs_builtin_sweep() { Some(Self::spawn_sweeper(&core)?) } else { None };

        debug!(
            cache = %core.options.name,
            sliding_ms = ?core.options.sliding_expiry.map(|d| d.as_millis()),
            absolute_ms = ?core.options.absolute_expiry.map(|d| d.as_millis()),
            sweeping = sweeper.is_some(),
            "cache collection created"
        );

        Ok(Self { core, sweeper: Mutex::new(sweeper) })
    }

    fn spawn_sweeper(core: &Arc<CacheCore<K, V, C>>) -> CacheResult<RecurringTimer> {
        let weak = Arc::downgrade(core);
        let thread_name = format!("{}-sweep", core.options.name);

        RecurringTimer::start(thread_name, core.options.expire_interval, move || {
            let Some(core) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            if core.is_disposed() {
                return ControlFlow::Break(());
            }
            core.sweep();
            ControlFlow::Continue(())
        })
        .map_err(|err| CacheError::timer(err.to_string()))
    }

    /// The options this cache was built with.
    pub fn options(&self) -> &CacheOptions<K, V> {
        &self.core.options
    }

    /// Whether a background sweep thread is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(RecurringTimer::is_running)
    }

    /// Get a value, refreshing its sliding window.
    ///
    /// Returns `Ok(None)` when the key is absent or was stale; a stale entry
    /// is evicted through the hook.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.core.lookup(key)
    }

    /// Get a value, or produce and store one.
    ///
    /// The producer runs without the cache lock held and may be slow. If two
    /// callers race on the same missing key, both producers may run; the
    /// first value stored wins and every caller receives it. The losing
    /// value is dropped without reaching the eviction hook.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal, including disposal
    /// that happens while the producer runs.
    pub fn get_or_add<F>(&self, key: K, produce: F) -> CacheResult<V>
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(value) = self.core.lookup(&key)? {
            return Ok(value);
        }
        let value = produce(&key);
        self.core.insert_if_vacant(key, value)
    }

    /// Like [`get_or_add`](Self::get_or_add) with a producer that can fail.
    ///
    /// # Errors
    ///
    /// A producer error is returned unchanged as
    /// [`GetOrAddError::Producer`] and nothing is stored.
    pub fn try_get_or_add<F, E>(&self, key: K, produce: F) -> Result<V, GetOrAddError<E>>
    where
        F: FnOnce(&K) -> Result<V, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(value) = self.core.lookup(&key)? {
            return Ok(value);
        }
        let value = produce(&key).map_err(|source| GetOrAddError::Producer { source })?;
        Ok(self.core.insert_if_vacant(key, value)?)
    }

    /// Get a value, or store the given one.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn get_or_add_value(&self, key: K, value: V) -> CacheResult<V> {
        self.get_or_add(key, move |_| value)
    }

    /// Insert or replace a value, refreshing both the sliding and the
    /// absolute window.
    ///
    /// Returns the replaced value when a fresh entry existed; ownership of
    /// it passes back to the caller and the hook is not called. A stale
    /// entry is evicted through the hook first and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn add_or_update(&self, key: K, value: V) -> CacheResult<Option<V>> {
        let mut entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        let expired = self.core.take_if_stale(&mut entries, &key, now);

        let previous = match entries.entry(key) {
            Slot::Occupied(mut slot) => Some(slot.get_mut().replace(value, now)),
            Slot::Vacant(slot) => {
                slot.insert(Entry::new(value, now));
                None
            }
        };
        drop(entries);

        self.core.metrics.record_write(previous.is_some());
        self.core.dispatch(expired);
        Ok(previous)
    }

    /// Insert `add_value` when the key is absent or stale, otherwise replace
    /// the current value with `update(key, current)`. Returns the stored
    /// value.
    ///
    /// `update` runs under the cache lock and must not call back into this
    /// cache. If it panics the entry is left unchanged. The value it
    /// replaces is dropped, not handed to the hook.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn add_or_update_with<F>(&self, key: K, add_value: V, update: F) -> CacheResult<V>
    where
        F: FnOnce(&K, &V) -> V,
    {
        let mut entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        let expired = self.core.take_if_stale(&mut entries, &key, now);

        let (stored, replaced) = match entries.entry(key) {
            Slot::Occupied(mut slot) => {
                let next = update(slot.key(), &slot.get().value);
                let previous = slot.get_mut().replace(next, now);
                (slot.get().value.clone(), Some(previous))
            }
            Slot::Vacant(slot) => (slot.insert(Entry::new(add_value, now)).value.clone(), None),
        };
        drop(entries);

        self.core.metrics.record_write(replaced.is_some());
        drop(replaced);
        self.core.dispatch(expired);
        Ok(stored)
    }

    /// Remove an entry, passing it to the eviction hook.
    ///
    /// Returns whether the key was present.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn remove(&self, key: &K) -> CacheResult<bool> {
        let removed = self.core.lock_live()?.remove_entry(key);
        let Some((key, entry)) = removed else {
            return Ok(false);
        };
        self.core.dispatch(Some(Eviction { key, value: entry.value, reason: EvictionReason::Removed }));
        Ok(true)
    }

    /// Remove an entry and hand its value to the caller instead of the hook.
    ///
    /// A stale entry is evicted through the hook and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn take(&self, key: &K) -> CacheResult<Option<V>> {
        let mut entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        if let Some(expired) = self.core.take_if_stale(&mut entries, key, now) {
            drop(entries);
            self.core.dispatch(Some(expired));
            return Ok(None);
        }
        let taken = entries.remove(key).map(|entry| entry.value);
        drop(entries);

        if taken.is_some() {
            self.core.metrics.record_eviction(EvictionReason::Removed);
        }
        Ok(taken)
    }

    /// Check whether a fresh entry exists for `key`.
    ///
    /// A stale entry is evicted and reported absent. With
    /// `refresh_on_contains` enabled (the default) a hit also refreshes the
    /// sliding window.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn contains(&self, key: &K) -> CacheResult<bool> {
        let mut entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        if let Some(expired) = self.core.take_if_stale(&mut entries, key, now) {
            drop(entries);
            self.core.dispatch(Some(expired));
            return Ok(false);
        }

        let refresh = self.core.options.refresh_on_contains;
        Ok(entries.get_mut(key).is_some_and(|entry| {
            if refresh {
                entry.touch(now);
            }
            true
        }))
    }

    /// Whether `key` is present but stale. Evicts nothing and refreshes
    /// nothing; an absent key reports `false`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn is_expired(&self, key: &K) -> CacheResult<bool> {
        let entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        Ok(entries.get(key).is_some_and(|entry| self.core.policy.is_stale(entry, now)))
    }

    /// Remove every entry, passing each to the hook. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn clear(&self) -> CacheResult<usize> {
        let drained = CacheCore::<K, V, C>::drain_all(
            &mut *self.core.lock_live()?,
            EvictionReason::Cleared,
        );
        let cleared = drained.len();
        debug!(cache = %self.core.options.name, cleared, "cache cleared");
        self.core.dispatch(drained);
        Ok(cleared)
    }

    /// Run a sweep now on the calling thread. Returns how many entries were
    /// evicted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn force_sweep(&self) -> CacheResult<usize> {
        if self.core.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(self.core.sweep())
    }

    fn collect_fresh<T>(&self, mut project: impl FnMut(&K, &V) -> T) -> CacheResult<Vec<T>> {
        let entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        Ok(entries
            .iter()
            .filter(|(_, entry)| !self.core.policy.is_stale(*entry, now))
            .map(|(key, entry)| project(key, &entry.value))
            .collect())
    }

    /// Keys of all fresh entries. Does not refresh or evict anything.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn keys(&self) -> CacheResult<Vec<K>> {
        self.collect_fresh(|key, _| key.clone())
    }

    /// Values of all fresh entries. Does not refresh or evict anything.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn values(&self) -> CacheResult<Vec<V>> {
        self.collect_fresh(|_, value| value.clone())
    }

    /// Key/value pairs of all fresh entries. Does not refresh or evict
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn snapshot(&self) -> CacheResult<Vec<(K, V)>> {
        self.collect_fresh(|key, value| (key.clone(), value.clone()))
    }

    /// Number of fresh entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn len(&self) -> CacheResult<usize> {
        let entries = self.core.lock_live()?;
        let now = self.core.clock.now();
        Ok(entries.values().filter(|entry| !self.core.policy.is_stale(*entry, now)).count())
    }

    /// Whether the cache holds no fresh entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Get cache statistics
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let size = self.core.lock_live()?.len();
        Ok(self.core.metrics.snapshot(size))
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Stop the sweep, evict every entry through the hook and reject all
    /// further operations. Calling it again does nothing.
    ///
    /// Waits for an in-flight background sweep to finish first, unless
    /// called from the sweep thread itself (from inside a hook).
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = self.sweeper.lock().take();
        if let Some(timer) = sweeper {
            timer.stop();
        }

        let drained =
            CacheCore::<K, V, C>::drain_all(&mut *self.core.entries.lock(), EvictionReason::Disposed);
        debug!(cache = %self.core.options.name, drained = drained.len(), "cache disposed");
        self.core.dispatch(drained);
    }
}

impl<K, V, C> Drop for CacheCollection<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<K, V, C> fmt::Debug for CacheCollection<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCollection")
            .field("name", &self.core.options.name)
            .field("stored", &self.core.entries.lock().len())
            .field("disposed", &self.is_disposed())
            .field("sweeping", &self.is_sweeping())
            .finish_non_exhaustive()
    }
}
