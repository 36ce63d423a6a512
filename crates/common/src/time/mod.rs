//! Time abstractions used by the cache
//!
//! - **[`clock`]**: real and mock time sources, so expiry can be driven
//!   deterministically in tests
//! - **[`timer`]**: a recurring timer on a dedicated thread with prompt
//!   cancellation
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use sirensong_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! ```

pub mod clock;
pub mod timer;

pub use clock::{Clock, MockClock, SystemClock};
pub use timer::{RecurringTimer, TimerHandle};
