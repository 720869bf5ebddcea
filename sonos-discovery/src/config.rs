//! Configuration for SSDP probing and description resolution.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// Search target used for ZonePlayer discovery.
pub const ZONE_PLAYER_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

/// Standard SSDP multicast group and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Configuration for the [`Prober`](crate::Prober).
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// `ST` header sent with every M-SEARCH
    pub search_target: String,

    /// `MX` header: maximum seconds a device may wait before replying
    pub mx: u8,

    /// How long the search socket stays open collecting replies
    pub search_window: Duration,

    /// Upper bound on fetching, parsing and enriching one device description
    pub description_timeout: Duration,

    /// Fetch and attach the SCPD document of every service
    pub fetch_service_descriptions: bool,

    /// Capacity of the discovery broadcast channel
    pub stream_capacity: usize,

    /// Local address the search socket binds to
    pub bind_addr: SocketAddr,

    /// Destination of the M-SEARCH datagram
    pub multicast_addr: SocketAddr,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: ZONE_PLAYER_SEARCH_TARGET.to_string(),
            mx: 1,
            search_window: Duration::from_secs(5),
            description_timeout: Duration::from_secs(10),
            fetch_service_descriptions: true,
            stream_capacity: 64,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            multicast_addr: SocketAddr::from(([239, 255, 255, 250], 1900)),
        }
    }
}

impl DiscoveryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any value would make a search meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.search_target.trim().is_empty() {
            return Err(DiscoveryError::Configuration(
                "search_target must not be empty".to_string(),
            ));
        }

        if self.mx == 0 || self.mx > 5 {
            return Err(DiscoveryError::Configuration(
                "mx must be between 1 and 5".to_string(),
            ));
        }

        if self.search_window.is_zero() {
            return Err(DiscoveryError::Configuration(
                "search_window must be greater than 0".to_string(),
            ));
        }

        if self.description_timeout.is_zero() {
            return Err(DiscoveryError::Configuration(
                "description_timeout must be greater than 0".to_string(),
            ));
        }

        if self.stream_capacity == 0 {
            return Err(DiscoveryError::Configuration(
                "stream_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the search window.
    pub fn with_search_window(mut self, window: Duration) -> Self {
        self.search_window = window;
        self
    }

    /// Set the per-device description timeout.
    pub fn with_description_timeout(mut self, timeout: Duration) -> Self {
        self.description_timeout = timeout;
        self
    }

    /// Enable or disable SCPD enrichment.
    pub fn with_service_descriptions(mut self, enabled: bool) -> Self {
        self.fetch_service_descriptions = enabled;
        self
    }

    /// Set the discovery channel capacity.
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// Send the M-SEARCH somewhere other than the SSDP multicast group.
    ///
    /// Mostly useful for pointing a search at a single host, or at a local
    /// socket in tests.
    pub fn with_multicast_addr(mut self, addr: SocketAddr) -> Self {
        self.multicast_addr = addr;
        self
    }

    /// Set the local bind address of the search socket.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}
