use std::time::Duration;

use thiserror::Error;

/// Errors produced while validating a [`GroupConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The freshness window is zero, so no result could ever be reused.
    #[error("freshness window must be greater than zero")]
    ZeroExpiry,
    /// An explicit sweep interval of zero would sweep on every call.
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
}

/// Configuration for a coalescing group.
///
/// # Fields
///
/// * `expires` - Freshness window. A call record started less than `expires` ago
///   is reused by new callers; older records are stale and trigger a new execution.
/// * `sweep_interval` - Minimum time between two expiration sweeps. `None` uses
///   twice the freshness window.
/// * `name` - Optional name. Attached to log events and, with the `stats`
///   feature, used to register the group's statistics in the
///   [`stats_registry`](crate::stats_registry).
///
/// # Examples
///
/// ```
/// use sflight_core::GroupConfig;
/// use std::time::Duration;
///
/// let config = GroupConfig::new(Duration::from_secs(5))
///     .with_sweep_interval(Duration::from_secs(30))
///     .with_name("user_lookup");
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_sweep_interval(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub expires: Duration,
    pub sweep_interval: Option<Duration>,
    pub name: Option<String>,
}

impl GroupConfig {
    /// Creates a configuration with the given freshness window and defaults for
    /// everything else.
    pub fn new(expires: Duration) -> Self {
        Self {
            expires,
            sweep_interval: None,
            name: None,
        }
    }

    /// Overrides the interval between expiration sweeps.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Names the group.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the sweep interval that will actually be used.
    ///
    /// Defaults to twice the freshness window, saturating at `Duration::MAX`.
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval
            .unwrap_or_else(|| self.expires.saturating_mul(2))
    }

    /// Checks the configuration for values that would make the group useless.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::ZeroExpiry`] if `expires` is zero
    /// * [`ConfigError::ZeroSweepInterval`] if an explicit sweep interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expires.is_zero() {
            return Err(ConfigError::ZeroExpiry);
        }
        if self.sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

impl From<Duration> for GroupConfig {
    fn from(expires: Duration) -> Self {
        Self::new(expires)
    }
}
