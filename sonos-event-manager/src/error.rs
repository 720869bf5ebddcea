use thiserror::Error;

/// Errors that can occur in the Sonos Event Manager
#[derive(Error, Debug)]
pub enum EventManagerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The worker thread or its runtime failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The background worker is no longer running
    #[error("Background worker has disconnected")]
    WorkerDisconnected,

    /// No discovered ZonePlayer has this UDN
    #[error("Device {0} not found")]
    DeviceNotFound(String),
}

impl From<sonos_discovery::DiscoveryError> for EventManagerError {
    fn from(err: sonos_discovery::DiscoveryError) -> Self {
        match err {
            sonos_discovery::DiscoveryError::Configuration(msg) => EventManagerError::Configuration(msg),
            other => EventManagerError::Runtime(other.to_string()),
        }
    }
}

impl From<sonos_stream::StreamError> for EventManagerError {
    fn from(err: sonos_stream::StreamError) -> Self {
        match err {
            sonos_stream::StreamError::Configuration(msg) => EventManagerError::Configuration(msg),
            other => EventManagerError::Runtime(other.to_string()),
        }
    }
}

/// Result type for Event Manager operations
pub type Result<T> = std::result::Result<T, EventManagerError>;
