//! Configuration for the event manager facade.

use std::time::Duration;

use sonos_discovery::DiscoveryConfig;
use sonos_stream::StreamConfig;

use crate::error::{EventManagerError, Result};

/// Configuration for [`SonosEventManager`](crate::SonosEventManager)
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// SSDP probing and description resolution
    pub discovery: DiscoveryConfig,

    /// Callback listener and GENA subscriptions
    pub stream: StreamConfig,

    /// Time between SSDP searches. The first search runs at startup.
    /// Default: 60 seconds
    pub search_interval: Duration,

    /// Subscribe to every newly discovered ZonePlayer
    /// Default: true
    pub auto_subscribe: bool,

    /// Only auto-subscribe players that have a media renderer sub-device
    /// Default: true
    pub media_renderers_only: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            stream: StreamConfig::default(),
            search_interval: Duration::from_secs(60),
            auto_subscribe: true,
            media_renderers_only: true,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        self.stream.validate()?;

        if self.search_interval.is_zero() {
            return Err(EventManagerError::Configuration(
                "Search interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_search_interval(mut self, interval: Duration) -> Self {
        self.search_interval = interval;
        self
    }

    pub fn with_auto_subscribe(mut self, enabled: bool) -> Self {
        self.auto_subscribe = enabled;
        self
    }

    pub fn with_media_renderers_only(mut self, enabled: bool) -> Self {
        self.media_renderers_only = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ManagerConfig::default();
        assert_eq!(config.search_interval, Duration::from_secs(60));
        assert!(config.auto_subscribe);
        assert!(config.media_renderers_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_covers_nested_configs() {
        let config = ManagerConfig::new().with_search_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(EventManagerError::Configuration(_))));

        let config = ManagerConfig::new().with_stream(StreamConfig::new().with_event_buffer_size(0));
        assert!(matches!(config.validate(), Err(EventManagerError::Configuration(_))));

        let config = ManagerConfig::new().with_discovery(DiscoveryConfig::new().with_stream_capacity(0));
        assert!(matches!(config.validate(), Err(EventManagerError::Configuration(_))));
    }
}
