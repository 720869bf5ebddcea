//! Retrieval of description documents.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DiscoveryError, Result};

/// Fetches device and service description documents by URL.
///
/// The prober goes through this trait for every HTTP GET so tests and
/// embedders can serve documents from elsewhere.
#[async_trait]
pub trait DescriptionSource: Send + Sync {
    /// Return the body of the document at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`DescriptionSource`] backed by an async `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDescriptionSource {
    client: reqwest::Client,
}

impl HttpDescriptionSource {
    /// Create a source whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DescriptionSource for HttpDescriptionSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!(%url, "fetching description");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Transport(format!(
                "GET {url} returned HTTP {status}"
            )));
        }

        Ok(response.text().await?)
    }
}
