//! Expiring cache collections
//!
//! A [`CacheCollection`] stores values for expensive lookups (textures,
//! parsed game-data rows) and drops them again once they have not been read
//! for a while (sliding expiry) or were written too long ago (absolute
//! expiry).
//!
//! # Features
//!
//! - **Thread-safe**: one internal lock per cache; share it with `Arc`
//! - **Generic**: any `K: Eq + Hash + Clone` and `V: Clone`
//! - **Two expiry windows**: sliding and absolute, stale when either fires
//! - **Background sweep**: a named thread evicts stale entries every
//!   `expire_interval`; disable it to expire only on access
//! - **Eviction hook**: called once for every entry that leaves the cache,
//!   so owned resources can be released
//! - **Testable**: clock abstraction for deterministic time-based testing
//!
//! # Examples
//!
//! ## Texture cache released on idle
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sirensong_common::cache::{CacheCollection, CacheOptions};
//!
//! struct Texture {
//!     path: String,
//! }
//!
//! let textures: CacheCollection<u32, Arc<Texture>> = CacheCollection::new(
//!     CacheOptions::builder()
//!         .name("icons")
//!         .sliding_expiry(Duration::from_secs(300))
//!         .no_absolute_expiry()
//!         .on_expiry(|_id, texture: Arc<Texture>| drop(texture))
//!         .build()?,
//! )?;
//!
//! let icon = textures.get_or_add(60_001, |id| Arc::new(Texture { path: format!("{id}.tex") }))?;
//! assert_eq!(icon.path, "60001.tex");
//! # Ok::<(), sirensong_common::error::CacheError>(())
//! ```
//!
//! ## Deterministic expiry in tests
//! ```
//! use std::time::Duration;
//!
//! use sirensong_common::cache::{CacheCollection, CacheOptions};
//! use sirensong_common::time::MockClock;
//!
//! let clock = MockClock::new();
//! let cache = CacheCollection::with_clock(
//!     CacheOptions::builder().absolute_expiry(Duration::from_secs(10)).use_builtin_expire(false).build()?,
//!     clock.clone(),
//! )?;
//!
//! cache.add_or_update("row", 1)?;
//! clock.advance(Duration::from_secs(11));
//! assert_eq!(cache.get(&"row")?, None);
//! # Ok::<(), sirensong_common::error::CacheError>(())
//! ```
//!
//! ## Maintaining several caches together
//! ```
//! use std::sync::Arc;
//!
//! use sirensong_common::cache::{CacheCollection, CacheGroup};
//!
//! let rows: Arc<CacheCollection<u32, String>> = Arc::new(CacheCollection::with_defaults()?);
//! let sub_rows: Arc<CacheCollection<(u32, u16), String>> =
//!     Arc::new(CacheCollection::with_defaults()?);
//!
//! let group = CacheGroup::new().with("rows", rows).with("sub_rows", sub_rows);
//! group.sweep_all();
//! group.dispose_all();
//! # Ok::<(), sirensong_common::error::CacheError>(())
//! ```
//!
//! # Thread Safety
//!
//! Eviction hooks run after the internal lock is released, on whichever
//! thread evicted the entry (a caller, or the sweep thread). A hook may
//! call back into the cache. A panicking hook is logged and skipped.

mod config;
mod core;
mod entry;
mod registry;
mod stats;

// Re-export public API
pub use core::CacheCollection;

pub use config::{
    CacheOptions, CacheOptionsBuilder, CacheSettings, EvictionHook, DEFAULT_ABSOLUTE_EXPIRY,
    DEFAULT_EXPIRE_INTERVAL,
};
pub use entry::{EvictionReason, ExpiryKind};
pub use registry::{CacheGroup, ExpiringCache};
pub use stats::CacheStats;
