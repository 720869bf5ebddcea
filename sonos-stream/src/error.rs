//! Error types for the sonos-stream crate.

/// Errors raised by the subscription manager and event pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The callback listener could not be started
    #[error("Callback listener error: {0}")]
    Listener(#[from] callback_server::CallbackServerError),

    /// A notification body could not be decoded
    #[error("Failed to parse event: {0}")]
    Parse(String),

    /// A GENA request failed
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The manager was shut down and accepts no new subscriptions
    #[error("Subscription manager has been shut down")]
    ShutDown,
}

/// Errors from individual GENA requests.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The HTTP request could not be completed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ZonePlayer answered with a non-success status
    #[error("Request rejected with HTTP status {0}")]
    Rejected(u16),

    /// A successful response carried no `SID` header
    #[error("Response is missing the SID header")]
    MissingSid,
}

impl From<reqwest::Error> for SubscriptionError {
    fn from(err: reqwest::Error) -> Self {
        SubscriptionError::Transport(err.to_string())
    }
}

impl From<sonos_discovery::DiscoveryError> for StreamError {
    fn from(err: sonos_discovery::DiscoveryError) -> Self {
        StreamError::Parse(err.to_string())
    }
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
