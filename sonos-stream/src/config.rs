//! Configuration types for the sonos-stream crate
//!
//! [`StreamConfig`] controls the callback listener, the GENA requests sent to
//! ZonePlayers, renewal scheduling and event buffering.

use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Result, StreamError};

/// Configuration for the SubscriptionManager
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Port range for the callback listener
    /// Default: (3400, 3500)
    pub callback_port_range: (u16, u16),

    /// Address placed in `CALLBACK` URLs. Detected when `None`.
    /// Default: None
    pub advertised_ip: Option<IpAddr>,

    /// Timeout requested in every SUBSCRIBE and renewal
    /// Default: 1800 seconds (30 minutes)
    pub subscription_timeout: Duration,

    /// How long before expiry a subscription is renewed
    /// Default: 15 seconds
    pub renewal_lead: Duration,

    /// Lower bound on the delay before any renewal
    /// Default: 1 second
    pub min_renewal_delay: Duration,

    /// Timeout for GENA HTTP requests
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Buffer size for the event multiplexer
    /// Default: 1000
    pub event_buffer_size: usize,

    /// How long a notification with an unknown SID waits for its
    /// subscription to be registered before it is dropped
    /// Default: 500 milliseconds
    pub notification_grace_period: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            callback_port_range: (3400, 3500),
            advertised_ip: None,
            subscription_timeout: Duration::from_secs(1800),
            renewal_lead: Duration::from_secs(15),
            min_renewal_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            event_buffer_size: 1000,
            notification_grace_period: Duration::from_millis(500),
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        let (start, end) = self.callback_port_range;
        if start > end {
            return Err(StreamError::Configuration(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.subscription_timeout.as_secs() == 0 {
            return Err(StreamError::Configuration(
                "Subscription timeout must be at least one second".to_string(),
            ));
        }

        if self.min_renewal_delay.is_zero() {
            return Err(StreamError::Configuration(
                "Minimum renewal delay must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(StreamError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_callback_port_range(mut self, start: u16, end: u16) -> Self {
        self.callback_port_range = (start, end);
        self
    }

    pub fn with_advertised_ip(mut self, ip: IpAddr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_renewal_lead(mut self, lead: Duration) -> Self {
        self.renewal_lead = lead;
        self
    }

    pub fn with_min_renewal_delay(mut self, delay: Duration) -> Self {
        self.min_renewal_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_notification_grace_period(mut self, grace: Duration) -> Self {
        self.notification_grace_period = grace;
        self
    }

    /// Delay before renewing a subscription granted for `granted`.
    ///
    /// `granted - renewal_lead` when that is at least `min_renewal_delay`,
    /// otherwise half the grant, never below `min_renewal_delay`.
    pub fn renewal_delay(&self, granted: Duration) -> Duration {
        match granted.checked_sub(self.renewal_lead) {
            Some(delay) if delay >= self.min_renewal_delay => delay,
            _ => (granted / 2).max(self.min_renewal_delay),
        }
    }
}
