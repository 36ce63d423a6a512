//! Cache options, builder and file-based settings
//!
//! [`CacheOptions`] is fixed at construction. It can be assembled with the
//! fluent [`CacheOptionsBuilder`], from one of the presets, or loaded from a
//! [`CacheSettings`] block in a TOML settings file.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::utils::serde::{duration_millis, duration_millis_or_disabled};

/// Absolute expiry applied when the caller configures nothing.
pub const DEFAULT_ABSOLUTE_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Default interval between background sweeps.
pub const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_NAME: &str = "cache";

/// Callback invoked with each key/value pair that leaves the cache.
///
/// Runs outside the cache lock, so it may call back into the cache.
pub type EvictionHook<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// Configuration for a [`CacheCollection`](super::CacheCollection)
pub struct CacheOptions<K, V> {
    /// Label used for the sweep thread name and in log fields.
    pub name: String,

    /// Evict entries not read for longer than this (None = disabled)
    pub sliding_expiry: Option<Duration>,

    /// Evict entries not written for longer than this (None = disabled)
    pub absolute_expiry: Option<Duration>,

    /// Called once for every entry that leaves the cache
    pub on_expiry: Option<EvictionHook<K, V>>,

    /// Period of the background sweep
    pub expire_interval: Duration,

    /// Whether to run the background sweep at all
    pub use_builtin_expire: bool,

    /// Whether `contains` counts as a read for the sliding window
    pub refresh_on_contains: bool,
}

impl<K, V> Default for CacheOptions<K, V> {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            sliding_expiry: None,
            absolute_expiry: Some(DEFAULT_ABSOLUTE_EXPIRY),
            on_expiry: None,
            expire_interval: DEFAULT_EXPIRE_INTERVAL,
            use_builtin_expire: true,
            refresh_on_contains: true,
        }
    }
}

impl<K, V> Clone for CacheOptions<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sliding_expiry: self.sliding_expiry,
            absolute_expiry: self.absolute_expiry,
            on_expiry: self.on_expiry.clone(),
            expire_interval: self.expire_interval,
            use_builtin_expire: self.use_builtin_expire,
            refresh_on_contains: self.refresh_on_contains,
        }
    }
}

impl<K, V> fmt::Debug for CacheOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("name", &self.name)
            .field("sliding_expiry", &self.sliding_expiry)
            .field("absolute_expiry", &self.absolute_expiry)
            .field("on_expiry", &self.on_expiry.as_ref().map(|_| "<hook>"))
            .field("expire_interval", &self.expire_interval)
            .field("use_builtin_expire", &self.use_builtin_expire)
            .field("refresh_on_contains", &self.refresh_on_contains)
            .finish()
    }
}

impl<K, V> CacheOptions<K, V> {
    /// Create a new options builder starting from the defaults
    pub fn builder() -> CacheOptionsBuilder<K, V> {
        CacheOptionsBuilder::default()
    }

    /// Preset for caches of idle-evicted resources such as textures.
    ///
    /// Only the sliding window applies; the default absolute window is
    /// switched off.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use sirensong_common::cache::CacheOptions;
    ///
    /// let options: CacheOptions<u32, String> = CacheOptions::sliding(Duration::from_secs(300));
    /// assert_eq!(options.absolute_expiry, None);
    /// ```
    pub fn sliding(window: Duration) -> Self {
        Self { sliding_expiry: Some(window), absolute_expiry: None, ..Self::default() }
    }

    /// Preset for caches whose entries go stale a fixed time after being
    /// written, regardless of reads.
    pub fn absolute(window: Duration) -> Self {
        Self { sliding_expiry: None, absolute_expiry: Some(window), ..Self::default() }
    }

    /// Default windows with the background sweep disabled; entries expire
    /// only when accessed or on `force_sweep`.
    pub fn manual() -> Self {
        Self { use_builtin_expire: false, ..Self::default() }
    }

    /// Build options from a settings block.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::default().with_settings(settings)
    }

    fn with_settings(mut self, settings: &CacheSettings) -> Self {
        self.sliding_expiry = settings.sliding_expiry;
        self.absolute_expiry = settings.absolute_expiry;
        self.expire_interval = settings.expire_interval;
        self.use_builtin_expire = settings.use_builtin_expire;
        self.refresh_on_contains = settings.refresh_on_contains;
        self
    }

    /// The serializable part of these options.
    pub fn to_settings(&self) -> CacheSettings {
        CacheSettings {
            sliding_expiry: self.sliding_expiry,
            absolute_expiry: self.absolute_expiry,
            expire_interval: self.expire_interval,
            use_builtin_expire: self.use_builtin_expire,
            refresh_on_contains: self.refresh_on_contains,
        }
    }

    /// Whether any expiry window is configured.
    pub const fn has_expiry_policy(&self) -> bool {
        self.sliding_expiry.is_some() || self.absolute_expiry.is_some()
    }

    /// Whether a cache built from these options starts a sweep thread.
    pub const fn runs_builtin_sweep(&self) -> bool {
        self.use_builtin_expire && self.has_expiry_policy()
    }

    /// Check the options for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for a zero-length expiry window, or a
    /// zero sweep interval when the sweep would run.
    pub fn validate(&self) -> CacheResult<()> {
        if self.sliding_expiry == Some(Duration::ZERO) {
            return Err(CacheError::config(
                "sliding_expiry",
                "must be greater than zero; use None to disable",
            ));
        }
        if self.absolute_expiry == Some(Duration::ZERO) {
            return Err(CacheError::config(
                "absolute_expiry",
                "must be greater than zero; use None to disable",
            ));
        }
        if self.runs_builtin_sweep() && self.expire_interval.is_zero() {
            return Err(CacheError::config("expire_interval", "must be greater than zero"));
        }
        if self.name.trim().is_empty() {
            return Err(CacheError::config("name", "must not be empty"));
        }
        Ok(())
    }
}

/// Builder for [`CacheOptions`] with fluent API
pub struct CacheOptionsBuilder<K, V> {
    options: CacheOptions<K, V>,
}

impl<K, V> Default for CacheOptionsBuilder<K, V> {
    fn default() -> Self {
        Self { options: CacheOptions::default() }
    }
}

impl<K, V> fmt::Debug for CacheOptionsBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptionsBuilder").field("options", &self.options).finish()
    }
}

impl<K, V> CacheOptionsBuilder<K, V> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache name used in logs and the sweep thread name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Set the sliding window
    pub fn sliding_expiry(mut self, window: Duration) -> Self {
        self.options.sliding_expiry = Some(window);
        self
    }

    /// Disable the sliding window
    pub fn no_sliding_expiry(mut self) -> Self {
        self.options.sliding_expiry = None;
        self
    }

    /// Set the absolute window
    pub fn absolute_expiry(mut self, window: Duration) -> Self {
        self.options.absolute_expiry = Some(window);
        self
    }

    /// Disable the absolute window, including the one-hour default
    pub fn no_absolute_expiry(mut self) -> Self {
        self.options.absolute_expiry = None;
        self
    }

    /// Set the eviction hook
    pub fn on_expiry<F>(mut self, hook: F) -> Self
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        self.options.on_expiry = Some(Arc::new(hook));
        self
    }

    /// Set an already shared eviction hook
    pub fn on_expiry_hook(mut self, hook: EvictionHook<K, V>) -> Self {
        self.options.on_expiry = Some(hook);
        self
    }

    /// Set the background sweep period
    pub fn expire_interval(mut self, interval: Duration) -> Self {
        self.options.expire_interval = interval;
        self
    }

    /// Enable or disable the background sweep
    pub fn use_builtin_expire(mut self, enabled: bool) -> Self {
        self.options.use_builtin_expire = enabled;
        self
    }

    /// Choose whether `contains` refreshes the sliding window
    pub fn refresh_on_contains(mut self, enabled: bool) -> Self {
        self.options.refresh_on_contains = enabled;
        self
    }

    /// Apply every field of a settings block, keeping name and hook
    pub fn settings(mut self, settings: &CacheSettings) -> Self {
        self.options = self.options.with_settings(settings);
        self
    }

    /// Validate and build the options
    ///
    /// # Errors
    ///
    /// See [`CacheOptions::validate`].
    pub fn build(self) -> CacheResult<CacheOptions<K, V>> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Serializable cache settings, durations in milliseconds.
///
/// Missing fields take the defaults. An expiry window of `0` disables that
/// window.
///
/// ```
/// use sirensong_common::cache::CacheSettings;
///
/// let settings = CacheSettings::from_toml_str(
///     r#"
///     sliding_expiry_ms = 300000
///     absolute_expiry_ms = 0
///     "#,
/// )?;
/// assert!(settings.absolute_expiry.is_none());
/// # Ok::<(), sirensong_common::error::CacheError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Sliding window (`0` = disabled)
    #[serde(rename = "sliding_expiry_ms", with = "duration_millis_or_disabled")]
    pub sliding_expiry: Option<Duration>,

    /// Absolute window (`0` = disabled)
    #[serde(rename = "absolute_expiry_ms", with = "duration_millis_or_disabled")]
    pub absolute_expiry: Option<Duration>,

    /// Sweep period
    #[serde(rename = "expire_interval_ms", with = "duration_millis")]
    pub expire_interval: Duration,

    /// Whether to run the background sweep
    pub use_builtin_expire: bool,

    /// Whether `contains` refreshes the sliding window
    pub refresh_on_contains: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheOptions::<(), ()>::default().to_settings()
    }
}

impl CacheSettings {
    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] when the text is not valid TOML or a
    /// field has the wrong type.
    pub fn from_toml_str(text: &str) -> CacheResult<Self> {
        Ok(toml::from_str(text)?)
    }
}
