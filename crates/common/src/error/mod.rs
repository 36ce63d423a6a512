//! Error types shared by the Sirensong cache components
//!
//! Cache operations report failures through [`CacheError`]. Operations that
//! run a caller-supplied producer wrap the producer's own error in
//! [`GetOrAddError`] so the original error is preserved unchanged.
//!
//! A missing key is never an error: lookups return `Ok(None)`.
//!
//! # ErrorClassification
//!
//! Every error type implements [`ErrorClassification`], giving callers a
//! uniform way to decide whether to retry, how loudly to log, and whether the
//! failure indicates a bug in the host plugin.
//!
//! ```
//! use sirensong_common::error::{CacheError, ErrorClassification, ErrorSeverity};
//!
//! let err = CacheError::Disposed;
//! assert!(!err.is_retryable());
//! assert_eq!(err.severity(), ErrorSeverity::Error);
//! ```

use std::fmt;

use thiserror::Error;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by cache collections and their supporting components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache was disposed; it accepts no further operations.
    #[error("cache has been disposed")]
    Disposed,

    /// A configuration value was rejected at construction time.
    #[error("invalid cache configuration for `{field}`: {message}")]
    Config {
        /// Name of the offending option.
        field: &'static str,
        /// Human readable reason.
        message: String,
    },

    /// The background sweep thread could not be started.
    #[error("failed to start expiry timer: {message}")]
    Timer {
        /// Underlying OS error message.
        message: String,
    },
}

impl CacheError {
    /// Create a configuration error for `field`.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::Config { field, message: message.into() }
    }

    /// Create a timer startup error.
    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer { message: message.into() }
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        Self::config("settings", err.to_string())
    }
}

/// Error returned by fallible get-or-add operations.
///
/// Generic over the producer's error type `E` so the caller receives the
/// original failure rather than a stringified copy.
#[derive(Debug, Error)]
pub enum GetOrAddError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The cache itself rejected the operation.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The value producer failed; nothing was stored.
    #[error("value producer failed")]
    Producer {
        /// Error returned by the producer.
        #[source]
        source: E,
    },
}

impl<E> GetOrAddError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns the producer error, if that is what failed.
    pub fn into_producer_error(self) -> Option<E> {
        match self {
            Self::Producer { source } => Some(source),
            Self::Cache(_) => None,
        }
    }

    /// Whether the cache had already been disposed.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Cache(CacheError::Disposed))
    }
}

/// Standard interface for classifying errors by their characteristics.
pub trait ErrorClassification {
    /// Check if retrying the same call may succeed.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level.
    ///
    /// Used for monitoring and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this error points at a programming or integrity problem.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for CacheError {
    fn is_retryable(&self) -> bool {
        // Thread creation can fail under transient resource pressure.
        matches!(self, Self::Timer { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Disposed | Self::Config { .. } => ErrorSeverity::Error,
            Self::Timer { .. } => ErrorSeverity::Critical,
        }
    }
}

impl<E> ErrorClassification for GetOrAddError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            Self::Cache(err) => err.is_retryable(),
            // The producer is caller code; a later attempt runs it afresh.
            Self::Producer { .. } => true,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cache(err) => err.severity(),
            Self::Producer { .. } => ErrorSeverity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use std::io;

    use super::*;

    /// Validates `CacheError::config` behavior for the config error display
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the message names the field and the reason.
    /// - Ensures the error is not retryable.
    #[test]
    fn test_config_error_display() {
        let err = CacheError::config("expire_interval", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid cache configuration for `expire_interval`: must be greater than zero"
        );
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    /// Validates `CacheError::timer` behavior for the timer failure
    /// classification scenario.
    ///
    /// Assertions:
    /// - Ensures timer failures are retryable and critical.
    #[test]
    fn test_timer_error_is_critical() {
        let err = CacheError::timer("resource temporarily unavailable");
        assert!(err.is_retryable());
        assert!(err.is_critical());
    }

    /// Validates `GetOrAddError::Producer` behavior for the producer error
    /// passthrough scenario.
    ///
    /// Assertions:
    /// - Confirms the original producer error is returned unchanged.
    /// - Ensures `is_disposed` is false.
    #[test]
    fn test_producer_error_passthrough() {
        let err: GetOrAddError<io::Error> =
            GetOrAddError::Producer { source: io::Error::new(io::ErrorKind::NotFound, "row 42") };
        assert!(!err.is_disposed());
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let source = err.into_producer_error();
        assert!(matches!(source, Some(ref e) if e.kind() == io::ErrorKind::NotFound));
    }

    /// Validates `GetOrAddError::from` behavior for the disposed conversion
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a converted `CacheError::Disposed` reports `is_disposed`.
    /// - Confirms the display text is forwarded transparently.
    #[test]
    fn test_disposed_conversion() {
        let err: GetOrAddError<io::Error> = CacheError::Disposed.into();
        assert!(err.is_disposed());
        assert_eq!(err.to_string(), "cache has been disposed");
        assert!(err.into_producer_error().is_none());
    }

    /// Validates `ErrorSeverity` ordering.
    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
