//! Timeout configuration for quarry-link connections.
//!
//! Centralizes the three clocks the RPC session runs on: dialing the socket,
//! waiting for an individual call's response, and the keepalive ping cadence.

use std::time::Duration;

/// Timeout configuration for a persistent RPC session.
///
/// # Examples
///
/// ```rust
/// use quarry_link::Timeouts;
/// use std::time::Duration;
///
/// // Defaults: 10s dial, 5s per call, ping every 30s
/// let timeouts = Timeouts::default();
///
/// let timeouts = Timeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .request_timeout_secs(20)
///     .build();
///
/// let timeouts = Timeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Timeout for establishing the socket (TCP + TLS + WebSocket upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// How long a single RPC call may stay in the correlation table before
    /// it is removed and failed with a timeout error.
    /// Default: 5 seconds
    pub request_timeout: Duration,

    /// Interval between fire-and-forget `ping` calls.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 30 seconds
    pub keepalive_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> TimeoutsBuilder {
        TimeoutsBuilder::new()
    }

    /// Short timeouts suitable for localhost servers.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`Timeouts`].
#[derive(Debug, Clone)]
pub struct TimeoutsBuilder {
    timeouts: Timeouts,
}

impl TimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: Timeouts::default(),
        }
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval. Zero disables pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    pub fn build(self) -> Timeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(5));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let timeouts = Timeouts::builder()
            .connection_timeout_secs(60)
            .request_timeout(Duration::from_millis(250))
            .keepalive_interval_secs(0)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.request_timeout, Duration::from_millis(250));
        assert!(timeouts.keepalive_interval.is_zero());
    }

    #[test]
    fn test_presets() {
        assert!(Timeouts::fast().connection_timeout <= Duration::from_secs(5));
        assert!(Timeouts::relaxed().request_timeout >= Duration::from_secs(30));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(Timeouts::is_no_timeout(Duration::ZERO));
        assert!(!Timeouts::is_no_timeout(Duration::from_secs(1)));
    }
}
