//! Integration tests for the cache module
//!
//! Covers concurrent access, the once-per-entry eviction hook guarantee,
//! hook failures and re-entrancy, and disposal racing other callers.

#![cfg(feature = "test-utils")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use sirensong_common::cache::{CacheCollection, CacheOptions};
use sirensong_common::error::CacheError;
use sirensong_common::testing::{init_test_tracing, EvictionLog, MockClock};

type Cache = CacheCollection<String, u64, MockClock>;

fn manual_cache(window: Duration) -> (Arc<Cache>, MockClock, EvictionLog<String, u64>) {
    let clock = MockClock::new();
    let log = EvictionLog::new();
    let options = CacheOptions::builder()
        .name("integration")
        .sliding_expiry(window)
        .no_absolute_expiry()
        .use_builtin_expire(false)
        .on_expiry_hook(log.hook())
        .build()
        .expect("valid options");
    let cache = CacheCollection::with_clock(options, clock.clone()).expect("cache created");
    (Arc::new(cache), clock, log)
}

/// Verifies that racing `get_or_add` callers all observe the same value.
///
/// # Test Steps
/// 1. Release 8 threads at once, each calling `get_or_add` on the same key
/// 2. Each producer returns a value unique to its thread
/// 3. Verify every caller got the same value and one entry is stored
/// 4. Verify losing producer values never reached the eviction hook
#[test]
fn test_concurrent_get_or_add_single_winner() {
    init_test_tracing();
    let (cache, _, log) = manual_cache(Duration::from_secs(60));
    let barrier = Arc::new(Barrier::new(8));
    let produced = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8u64)
        .map(|id| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let produced = Arc::clone(&produced);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_add("sheet".to_string(), |_| {
                        produced.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        id
                    })
                    .expect("cache is live")
            })
        })
        .collect();

    let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.windows(2).all(|pair| pair[0] == pair[1]), "callers disagree: {results:?}");
    assert!(produced.load(Ordering::SeqCst) >= 1);
    assert_eq!(cache.len().unwrap(), 1);
    assert_eq!(cache.get(&"sheet".to_string()).unwrap(), Some(results[0]));
    assert!(log.is_empty());
}

/// Validates that every entry reaches the hook exactly once while writers,
/// sweeps and clock advances interleave.
///
/// # Test Steps
/// 1. Four writer threads insert 250 distinct keys each
/// 2. A sweeper thread advances the clock and forces sweeps meanwhile
/// 3. Dispose the cache to drain whatever remains
/// 4. Verify 1000 evictions were recorded with no key seen twice
#[test]
fn test_hook_called_once_per_entry_under_contention() {
    init_test_tracing();
    let (cache, clock, log) = manual_cache(Duration::from_secs(5));

    let writers: Vec<_> = (0..4u64)
        .map(|writer| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..250u64 {
                    cache.add_or_update(format!("w{writer}-{i}"), writer * 1000 + i).unwrap();
                    if i % 10 == 0 {
                        let _ = cache.get(&format!("w{writer}-{}", i / 2)).unwrap();
                    }
                }
            })
        })
        .collect();

    let sweeper = {
        let cache = Arc::clone(&cache);
        let clock = clock.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                clock.advance(Duration::from_secs(1));
                cache.force_sweep().unwrap();
                thread::yield_now();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    sweeper.join().unwrap();
    cache.dispose();

    assert_eq!(log.len(), 1000);
    let mut keys = log.keys();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 1000, "an entry reached the hook more than once");
}

/// Ensures a panicking hook neither poisons the cache nor skips other
/// evictions.
///
/// # Test Steps
/// 1. Install a hook that panics for one key and records the rest
/// 2. Evict by access, by sweep and by clear
/// 3. Verify all other keys were recorded and the cache keeps working
#[test]
fn test_panicking_hook_does_not_poison_cache() {
    init_test_tracing();
    let clock = MockClock::new();
    let log: EvictionLog<String, u64> = EvictionLog::new();
    let recorder = log.hook();
    let options = CacheOptions::builder()
        .sliding_expiry(Duration::from_secs(10))
        .no_absolute_expiry()
        .use_builtin_expire(false)
        .on_expiry(move |key: String, value: u64| {
            if key.starts_with("boom") {
                panic!("texture release failed for {key}");
            }
            recorder(key, value);
        })
        .build()
        .unwrap();
    let cache: Cache = CacheCollection::with_clock(options, clock.clone()).unwrap();

    cache.add_or_update("boom-1".to_string(), 1).unwrap();
    cache.add_or_update("ok-1".to_string(), 2).unwrap();
    clock.advance(Duration::from_secs(11));

    assert_eq!(cache.get(&"boom-1".to_string()).unwrap(), None);
    assert_eq!(cache.force_sweep().unwrap(), 1);

    cache.add_or_update("boom-2".to_string(), 3).unwrap();
    cache.add_or_update("ok-2".to_string(), 4).unwrap();
    assert_eq!(cache.clear().unwrap(), 2);

    assert_eq!(log.events(), vec![("ok-1".to_string(), 2), ("ok-2".to_string(), 4)]);

    cache.add_or_update("after".to_string(), 5).unwrap();
    assert_eq!(cache.get(&"after".to_string()).unwrap(), Some(5));
    assert_eq!(cache.stats().unwrap().expirations, 2);
}

/// Validates that a hook can call back into the cache that evicted the
/// entry.
///
/// # Test Steps
/// 1. Build a hook that re-inserts evicted keys under an `archived:` prefix
/// 2. Clear three entries; the hook re-enters the cache for each
/// 3. Verify the archived copies are present and nothing deadlocked
/// 4. Dispose; re-entrant writes now fail with `Disposed` and are ignored
#[test]
fn test_hook_reentrancy() {
    init_test_tracing();
    let slot: Arc<OnceLock<Weak<Cache>>> = Arc::new(OnceLock::new());
    let rejected = Arc::new(AtomicUsize::new(0));

    let hook_slot = Arc::clone(&slot);
    let hook_rejected = Arc::clone(&rejected);
    let options = CacheOptions::builder()
        .sliding_expiry(Duration::from_secs(10))
        .use_builtin_expire(false)
        .on_expiry(move |key: String, value: u64| {
            if key.starts_with("archived:") {
                return;
            }
            let Some(cache) = hook_slot.get().and_then(Weak::upgrade) else {
                return;
            };
            match cache.add_or_update(format!("archived:{key}"), value) {
                Ok(_) => {}
                Err(CacheError::Disposed) => {
                    hook_rejected.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        })
        .build()
        .unwrap();
    let cache: Arc<Cache> = Arc::new(CacheCollection::with_clock(options, MockClock::new()).unwrap());
    slot.set(Arc::downgrade(&cache)).unwrap();

    for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
        cache.add_or_update(name.to_string(), i as u64).unwrap();
    }

    assert_eq!(cache.clear().unwrap(), 3);
    let mut keys = cache.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["archived:a", "archived:b", "archived:c"]);

    cache.add_or_update("d".to_string(), 3).unwrap();
    cache.dispose();
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
}

/// Verifies disposal semantics from the outside.
///
/// # Test Steps
/// 1. Populate a cache and dispose it twice
/// 2. Verify the hook saw each entry once
/// 3. Verify subsequent operations report `Disposed`
#[test]
fn test_dispose_is_idempotent_and_final() {
    init_test_tracing();
    let (cache, _, log) = manual_cache(Duration::from_secs(10));
    for i in 0..10u64 {
        cache.add_or_update(format!("row-{i}"), i).unwrap();
    }

    cache.dispose();
    cache.dispose();

    assert!(cache.is_disposed());
    assert_eq!(log.len(), 10);
    assert_eq!(cache.get(&"row-1".to_string()), Err(CacheError::Disposed));
    assert_eq!(cache.get_or_add_value("row-1".to_string(), 1), Err(CacheError::Disposed));
    assert_eq!(cache.snapshot(), Err(CacheError::Disposed));
    assert_eq!(cache.values(), Err(CacheError::Disposed));
    assert_eq!(cache.is_empty(), Err(CacheError::Disposed));
}

/// Ensures concurrent `dispose` calls drain each entry exactly once.
///
/// # Test Steps
/// 1. Populate 100 entries
/// 2. Release 8 threads that call `dispose` at once
/// 3. Verify the hook ran 100 times in total
#[test]
fn test_concurrent_dispose_drains_once() {
    init_test_tracing();
    let (cache, _, log) = manual_cache(Duration::from_secs(10));
    for i in 0..100u64 {
        cache.add_or_update(format!("row-{i}"), i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.dispose();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(log.len(), 100);
    assert!(cache.is_disposed());
}

/// Validates that writers racing `dispose` either land before the drain or
/// are rejected, so no value escapes the hook.
///
/// # Test Steps
/// 1. Start writers that insert until they see `Disposed`
/// 2. Dispose from the main thread mid-way
/// 3. Verify every accepted insert reached the hook exactly once
#[test]
fn test_writers_racing_dispose() {
    init_test_tracing();
    let (cache, _, log) = manual_cache(Duration::from_secs(10));
    let accepted = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..4u64)
        .map(|writer| {
            let cache = Arc::clone(&cache);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for i in 0.. {
                    match cache.add_or_update(format!("w{writer}-{i}"), i) {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(CacheError::Disposed) => break,
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    cache.dispose();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(log.len(), accepted.load(Ordering::SeqCst));
}
