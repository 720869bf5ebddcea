//! Error types for the discovery system.

/// Error type for discovery operations.
///
/// Covers socket and HTTP failures while probing or fetching descriptions,
/// malformed SSDP or XML payloads, and resolutions that run past their
/// deadline.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Network-related errors (socket creation, HTTP requests, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Parsing errors (XML, SSDP response, etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation timed out waiting for responses
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Description data that cannot describe a ZonePlayer
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout(err.to_string())
        } else {
            DiscoveryError::Transport(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for DiscoveryError {
    fn from(err: quick_xml::Error) -> Self {
        DiscoveryError::Parse(err.to_string())
    }
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_display() {
        let error = DiscoveryError::Transport("connection refused".to_string());
        assert_eq!(error.to_string(), "Transport error: connection refused");

        let error = DiscoveryError::Parse("unexpected EOF".to_string());
        assert_eq!(error.to_string(), "Parse error: unexpected EOF");

        let error = DiscoveryError::Timeout("description fetch".to_string());
        assert_eq!(error.to_string(), "Operation timed out: description fetch");

        let error = DiscoveryError::InvalidDevice("missing UDN".to_string());
        assert!(error.to_string().contains("missing UDN"));
    }
}
