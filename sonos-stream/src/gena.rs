//! GENA HTTP client for subscription operations.
//!
//! Handles only the HTTP side of SUBSCRIBE, renewal and UNSUBSCRIBE.
//! Registry state and scheduling live in the subscription manager.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use sonos_discovery::ServiceDescriptor;
use tracing::debug;

use crate::error::SubscriptionError;

/// Outcome of a successful SUBSCRIBE or renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenaGrant {
    /// Subscription ID from the `SID` response header
    pub sid: String,
    /// Timeout granted by the device
    pub timeout: Duration,
}

/// The GENA requests the subscription manager issues.
///
/// [`HttpGenaClient`] is the production implementation.
#[async_trait]
pub trait GenaTransport: Send + Sync {
    /// Create a subscription delivering to `callback_url`.
    async fn subscribe(
        &self,
        service: &ServiceDescriptor,
        callback_url: &str,
        timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError>;

    /// Extend an existing subscription.
    async fn renew(
        &self,
        service: &ServiceDescriptor,
        sid: &str,
        timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError>;

    /// Cancel a subscription.
    async fn unsubscribe(&self, service: &ServiceDescriptor, sid: &str) -> Result<(), SubscriptionError>;
}

/// reqwest-backed GENA client.
#[derive(Debug, Clone)]
pub struct HttpGenaClient {
    client: Client,
}

impl HttpGenaClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SubscriptionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, SubscriptionError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SubscriptionError::Rejected(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenaTransport for HttpGenaClient {
    async fn subscribe(
        &self,
        service: &ServiceDescriptor,
        callback_url: &str,
        timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError> {
        let url = service.event_endpoint();
        debug!(%url, callback_url, "SUBSCRIBE");

        let request = self
            .client
            .request(gena_method("SUBSCRIBE")?, &url)
            .header("CALLBACK", format!("<{callback_url}>"))
            .header("NT", "upnp:event")
            .header("TIMEOUT", timeout_header(timeout));
        let response = self.send(request).await?;

        let sid = header(&response, "SID").ok_or(SubscriptionError::MissingSid)?;
        let timeout = parse_timeout(header(&response, "TIMEOUT").as_deref(), timeout);

        Ok(GenaGrant { sid, timeout })
    }

    async fn renew(
        &self,
        service: &ServiceDescriptor,
        sid: &str,
        timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError> {
        let url = service.event_endpoint();
        debug!(%url, sid, "renewing subscription");

        let request = self
            .client
            .request(gena_method("SUBSCRIBE")?, &url)
            .header("SID", sid)
            .header("TIMEOUT", timeout_header(timeout));
        let response = self.send(request).await?;

        // Devices normally echo the SID; keep the old one if they don't
        let sid = header(&response, "SID").unwrap_or_else(|| sid.to_string());
        let timeout = parse_timeout(header(&response, "TIMEOUT").as_deref(), timeout);

        Ok(GenaGrant { sid, timeout })
    }

    async fn unsubscribe(&self, service: &ServiceDescriptor, sid: &str) -> Result<(), SubscriptionError> {
        let url = service.event_endpoint();
        debug!(%url, sid, "UNSUBSCRIBE");

        let request = self
            .client
            .request(gena_method("UNSUBSCRIBE")?, &url)
            .header("SID", sid);
        self.send(request).await?;
        Ok(())
    }
}

fn gena_method(name: &str) -> Result<Method, SubscriptionError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| SubscriptionError::Transport(format!("invalid method {name}: {e}")))
}

fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn timeout_header(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

/// Parse a GENA `TIMEOUT` header value.
///
/// Accepts `Second-<n>` in any case. `infinite`, a missing header or an
/// unparseable value fall back to `requested`.
pub fn parse_timeout(value: Option<&str>, requested: Duration) -> Duration {
    value
        .map(str::trim)
        .and_then(|value| {
            let (prefix, seconds) = value.split_at_checked(7)?;
            if !prefix.eq_ignore_ascii_case("second-") {
                return None;
            }
            seconds.trim().parse::<u64>().ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const REQUESTED: Duration = Duration::from_secs(1800);

    fn service_on(host_url: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            service_type: "urn:schemas-upnp-org:service:RenderingControl:1".to_string(),
            service_id: "urn:upnp-org:serviceId:RenderingControl".to_string(),
            control_url: "/MediaRenderer/RenderingControl/Control".to_string(),
            event_sub_url: "/MediaRenderer/RenderingControl/Event".to_string(),
            scpd_url: "/xml/RenderingControl1.xml".to_string(),
            host_url: host_url.to_string(),
            description: None,
        }
    }

    fn client() -> HttpGenaClient {
        HttpGenaClient::new(Duration::from_secs(5)).unwrap()
    }

    #[rstest]
    #[case(Some("Second-120"), 120)]
    #[case(Some("second-300"), 300)]
    #[case(Some("SECOND-45"), 45)]
    #[case(Some(" Second-60 "), 60)]
    #[case(Some("infinite"), 1800)]
    #[case(Some("Second-abc"), 1800)]
    #[case(Some("Sec"), 1800)]
    #[case(None, 1800)]
    fn test_parse_timeout(#[case] header: Option<&str>, #[case] expected: u64) {
        assert_eq!(parse_timeout(header, REQUESTED), Duration::from_secs(expected));
    }

    #[tokio::test]
    async fn test_subscribe_sends_gena_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("SUBSCRIBE", "/MediaRenderer/RenderingControl/Event")
            .match_header("CALLBACK", "<http://192.168.1.20:3400/>")
            .match_header("NT", "upnp:event")
            .match_header("TIMEOUT", "Second-1800")
            .with_status(200)
            .with_header("SID", "uuid:RINCON_000E58A0123401400_sub0000000001")
            .with_header("TIMEOUT", "Second-120")
            .create_async()
            .await;

        let grant = client()
            .subscribe(&service_on(&server.host_with_port()), "http://192.168.1.20:3400/", REQUESTED)
            .await
            .unwrap();

        assert_eq!(grant.sid, "uuid:RINCON_000E58A0123401400_sub0000000001");
        assert_eq!(grant.timeout, Duration::from_secs(120));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_subscribe_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("SUBSCRIBE", "/MediaRenderer/RenderingControl/Event")
            .with_status(503)
            .create_async()
            .await;

        let result = client()
            .subscribe(&service_on(&server.host_with_port()), "http://127.0.0.1:3400/", REQUESTED)
            .await;

        assert!(matches!(result, Err(SubscriptionError::Rejected(503))));
    }

    #[tokio::test]
    async fn test_subscribe_without_sid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("SUBSCRIBE", "/MediaRenderer/RenderingControl/Event")
            .with_status(200)
            .with_header("TIMEOUT", "Second-120")
            .create_async()
            .await;

        let result = client()
            .subscribe(&service_on(&server.host_with_port()), "http://127.0.0.1:3400/", REQUESTED)
            .await;

        assert!(matches!(result, Err(SubscriptionError::MissingSid)));
    }

    #[tokio::test]
    async fn test_renew_sends_sid_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("SUBSCRIBE", "/MediaRenderer/RenderingControl/Event")
            .match_header("SID", "uuid:sub-1")
            .match_header("TIMEOUT", "Second-1800")
            .match_header("CALLBACK", mockito::Matcher::Missing)
            .match_header("NT", mockito::Matcher::Missing)
            .with_status(200)
            .with_header("TIMEOUT", "Second-600")
            .create_async()
            .await;

        let grant = client()
            .renew(&service_on(&server.host_with_port()), "uuid:sub-1", REQUESTED)
            .await
            .unwrap();

        assert_eq!(grant.sid, "uuid:sub-1");
        assert_eq!(grant.timeout, Duration::from_secs(600));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("UNSUBSCRIBE", "/MediaRenderer/RenderingControl/Event")
            .match_header("SID", "uuid:sub-1")
            .with_status(200)
            .create_async()
            .await;

        client()
            .unsubscribe(&service_on(&server.host_with_port()), "uuid:sub-1")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        let result = client()
            .subscribe(&service_on("127.0.0.1:1"), "http://127.0.0.1:3400/", REQUESTED)
            .await;

        assert!(matches!(result, Err(SubscriptionError::Transport(_))));
    }
}
