//! Testing utilities and helpers
//!
//! - **[`EvictionLog`]**: an eviction hook that records what left a cache
//! - **[`wait_until`]**: poll a condition while a background thread works
//! - **[`init_test_tracing`]**: route `tracing` output to the test harness
//! - Clock abstractions, re-exported from [`crate::time`]
//!
//! ## Usage
//!
//! Requires the `test-utils` feature outside of this crate's own tests.
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! use sirensong_common::cache::{CacheCollection, CacheOptions};
//! use sirensong_common::testing::{EvictionLog, MockClock};
//!
//! let clock = MockClock::new();
//! let log = EvictionLog::new();
//! let options = CacheOptions::builder()
//!     .sliding_expiry(Duration::from_secs(1))
//!     .use_builtin_expire(false)
//!     .on_expiry_hook(log.hook())
//!     .build()?;
//! let cache = CacheCollection::with_clock(options, clock.clone())?;
//!
//! cache.add_or_update("a", 1)?;
//! clock.advance(Duration::from_secs(2));
//! cache.force_sweep()?;
//! assert_eq!(log.events(), vec![("a", 1)]);
//! # Ok::<(), sirensong_common::error::CacheError>(())
//! ```

use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::EvictionHook;
pub use crate::time::{Clock, MockClock, SystemClock};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Records every `(key, value)` pair passed to its hook.
///
/// Clones share one log, so a test keeps a clone while the cache owns the
/// hook.
#[derive(Debug)]
pub struct EvictionLog<K, V> {
    events: Arc<Mutex<Vec<(K, V)>>>,
}

impl<K, V> Clone for EvictionLog<K, V> {
    fn clone(&self) -> Self {
        Self { events: Arc::clone(&self.events) }
    }
}

impl<K, V> Default for EvictionLog<K, V> {
    fn default() -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<K, V> EvictionLog<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook appending to this log.
    pub fn hook(&self) -> EvictionHook<K, V> {
        let events = Arc::clone(&self.events);
        Arc::new(move |key, value| events.lock().push((key, value)))
    }

    /// Number of recorded evictions.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Recorded pairs in eviction order.
    pub fn events(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.events.lock().clone()
    }

    /// Recorded keys in eviction order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.events.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// How many times `key` was evicted.
    pub fn count_for(&self, key: &K) -> usize
    where
        K: PartialEq,
    {
        self.events.lock().iter().filter(|(recorded, _)| recorded == key).count()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition was met.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `sirensong_common=debug`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sirensong_common=debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
