//! Common utility helpers
//!
//! - **[`serde`]**: serialization helpers for settings files

pub mod serde;

// Re-export commonly used items for convenience
pub use self::serde::{duration_millis, duration_millis_or_disabled};
