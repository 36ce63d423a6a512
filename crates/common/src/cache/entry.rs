//! Entry records and the staleness predicate
//!
//! Each cached value lives in one record together with its access and update
//! timestamps, so a key can never have metadata without a value or the
//! reverse.

use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

/// Which expiry window an entry overran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryKind {
    /// Not read within the sliding window.
    Sliding,
    /// Not written within the absolute window.
    Absolute,
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// The entry was stale when accessed or swept.
    Expired(ExpiryKind),
    /// Explicitly removed by key.
    Removed,
    /// Removed by `clear`.
    Cleared,
    /// Drained while the cache was disposed.
    Disposed,
}

impl EvictionReason {
    /// Stable lowercase label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired(ExpiryKind::Sliding) => "expired_sliding",
            Self::Expired(ExpiryKind::Absolute) => "expired_absolute",
            Self::Removed => "removed",
            Self::Cleared => "cleared",
            Self::Disposed => "disposed",
        }
    }

    /// Whether the entry left because it went stale.
    pub const fn is_expiry(self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value plus expiry metadata.
#[derive(Debug, Clone)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    last_access: Instant,
    last_update: Instant,
}

impl<V> Entry<V> {
    pub(crate) const fn new(value: V, now: Instant) -> Self {
        Self { value, last_access: now, last_update: now }
    }

    /// Record a read.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    /// Swap in a new value; a write counts as both an update and an access.
    pub(crate) fn replace(&mut self, value: V, now: Instant) -> V {
        self.last_access = now;
        self.last_update = now;
        mem::replace(&mut self.value, value)
    }

    #[cfg(test)]
    pub(crate) const fn last_access(&self) -> Instant {
        self.last_access
    }

    #[cfg(test)]
    pub(crate) const fn last_update(&self) -> Instant {
        self.last_update
    }
}

/// An entry already removed from the map, waiting for the hook.
pub(crate) struct Eviction<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) reason: EvictionReason,
}

/// The sliding and absolute windows, evaluated with OR semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ExpiryPolicy {
    sliding: Option<Duration>,
    absolute: Option<Duration>,
}

impl ExpiryPolicy {
    pub(crate) const fn new(sliding: Option<Duration>, absolute: Option<Duration>) -> Self {
        Self { sliding, absolute }
    }

    /// Returns the window the entry overran, or `None` while it is fresh.
    ///
    /// An entry exactly at a window boundary is still fresh. When both
    /// windows are exceeded the absolute one is reported.
    pub(crate) fn staleness<V>(&self, entry: &Entry<V>, now: Instant) -> Option<ExpiryKind> {
        let overran = |since: Instant, window: Option<Duration>| {
            window.is_some_and(|window| now.saturating_duration_since(since) > window)
        };

        if overran(entry.last_update, self.absolute) {
            Some(ExpiryKind::Absolute)
        } else if overran(entry.last_access, self.sliding) {
            Some(ExpiryKind::Sliding)
        } else {
            None
        }
    }

    pub(crate) fn is_stale<V>(&self, entry: &Entry<V>, now: Instant) -> bool {
        self.staleness(entry, now).is_some()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::entry.
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    /// Validates `ExpiryPolicy::staleness` behavior for the sliding boundary
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures an entry exactly at the window edge is fresh.
    /// - Confirms one nanosecond past the edge is reported as sliding expiry.
    #[test]
    fn test_sliding_boundary_is_strict() {
        let start = Instant::now();
        let entry = Entry::new("texture", start);
        let policy = ExpiryPolicy::new(Some(10 * SECOND), None);

        assert_eq!(policy.staleness(&entry, start + 10 * SECOND), None);
        assert_eq!(
            policy.staleness(&entry, start + 10 * SECOND + Duration::from_nanos(1)),
            Some(ExpiryKind::Sliding)
        );
    }

    /// Validates `Entry::touch` behavior for the sliding refresh scenario.
    ///
    /// Assertions:
    /// - Ensures a read moves the sliding deadline forward.
    /// - Ensures a read does not move the absolute deadline.
    #[test]
    fn test_touch_refreshes_only_access_time() {
        let start = Instant::now();
        let mut entry = Entry::new(7_u32, start);
        entry.touch(start + 8 * SECOND);

        assert_eq!(entry.last_access(), start + 8 * SECOND);
        assert_eq!(entry.last_update(), start);

        let sliding = ExpiryPolicy::new(Some(10 * SECOND), None);
        assert!(!sliding.is_stale(&entry, start + 15 * SECOND));

        let absolute = ExpiryPolicy::new(None, Some(10 * SECOND));
        assert!(absolute.is_stale(&entry, start + 15 * SECOND));
    }

    /// Validates `Entry::replace` behavior for the write refresh scenario.
    ///
    /// Assertions:
    /// - Confirms the previous value is returned.
    /// - Confirms both timestamps move to the write time.
    #[test]
    fn test_replace_refreshes_both_timestamps() {
        let start = Instant::now();
        let mut entry = Entry::new(1_u32, start);

        let previous = entry.replace(2, start + 3 * SECOND);

        assert_eq!(previous, 1);
        assert_eq!(entry.value, 2);
        assert_eq!(entry.last_access(), start + 3 * SECOND);
        assert_eq!(entry.last_update(), start + 3 * SECOND);
    }

    /// Validates `ExpiryPolicy::staleness` behavior for the combined windows
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the entry goes stale at the earlier of the two deadlines.
    /// - Confirms the absolute window wins when both are exceeded.
    #[test]
    fn test_combined_windows_use_earliest_deadline() {
        let start = Instant::now();
        let mut entry = Entry::new((), start);
        let policy = ExpiryPolicy::new(Some(2 * SECOND), Some(5 * SECOND));

        // Keep the sliding window alive; absolute still fires at 5s.
        entry.touch(start + 2 * SECOND);
        entry.touch(start + 4 * SECOND);
        assert_eq!(policy.staleness(&entry, start + 5 * SECOND), None);
        assert_eq!(
            policy.staleness(&entry, start + 5 * SECOND + Duration::from_millis(1)),
            Some(ExpiryKind::Absolute)
        );

        // Idle entry: sliding fires first.
        let idle = Entry::new((), start);
        assert_eq!(policy.staleness(&idle, start + 3 * SECOND), Some(ExpiryKind::Sliding));
    }

    /// Validates `ExpiryPolicy::default` behavior for the disabled policy
    /// scenario.
    #[test]
    fn test_no_windows_never_stale() {
        let start = Instant::now();
        let entry = Entry::new((), start);
        assert!(!ExpiryPolicy::default().is_stale(&entry, start + 1_000_000 * SECOND));
    }

    /// Validates `EvictionReason` labels.
    #[test]
    fn test_eviction_reason_labels() {
        assert_eq!(EvictionReason::Expired(ExpiryKind::Sliding).to_string(), "expired_sliding");
        assert_eq!(EvictionReason::Disposed.as_str(), "disposed");
        assert!(EvictionReason::Expired(ExpiryKind::Absolute).is_expiry());
        assert!(!EvictionReason::Cleared.is_expiry());
    }
}
