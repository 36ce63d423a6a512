//! Shared building blocks for Sirensong plugins.
//!
//! The centrepiece is [`cache::CacheCollection`], a thread-safe key/value
//! cache with sliding and absolute expiry, a background sweep, and an
//! eviction hook for releasing resources held by cached values.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, settings and serde helpers
//! - `runtime` (default): cache collections, clocks and timers
//! - `observability`: tracing (included by `runtime`)
//! - `test-utils`: eviction recorders, polling helpers, test tracing setup

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(feature = "test-utils", test)))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{CacheCollection, CacheGroup, CacheOptions, CacheStats, ExpiringCache};
#[cfg(feature = "foundation")]
pub use error::{CacheError, CacheResult, ErrorClassification, ErrorSeverity, GetOrAddError};
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
