//! Error types for the callback server.

use std::net::IpAddr;

/// Errors raised while starting the callback server.
#[derive(Debug, thiserror::Error)]
pub enum CallbackServerError {
    /// Every port in the configured range was taken
    #[error("No available port in range {start}-{end} on {ip}: {last_error}")]
    NoAvailablePort {
        ip: IpAddr,
        start: u16,
        end: u16,
        last_error: String,
    },

    /// No address to advertise in callback URLs
    #[error("Could not determine a local IP address for callback URLs")]
    LocalAddress,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience Result type alias for callback server operations.
pub type Result<T> = std::result::Result<T, CallbackServerError>;
