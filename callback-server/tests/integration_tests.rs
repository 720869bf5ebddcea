//! Integration tests for the callback server.
//!
//! These tests start a real HTTP server on loopback, send actual NOTIFY
//! requests and verify what reaches the channel.

use callback_server::{CallbackConfig, CallbackServer, NotificationPayload};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const EVENT_XML: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
    <e:property>
        <TransportState>PLAYING</TransportState>
    </e:property>
    <e:property>
        <CurrentTrackURI>x-sonos-spotify:spotify%3atrack%3a1234567890</CurrentTrackURI>
    </e:property>
</e:propertyset>"#;

async fn start_server() -> (CallbackServer, mpsc::UnboundedReceiver<NotificationPayload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = CallbackConfig::default()
        .with_port_range(0, 0)
        .with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_advertised_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let server = CallbackServer::start(config, tx)
        .await
        .expect("Failed to start callback server");
    (server, rx)
}

fn notify(client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    let method = reqwest::Method::from_bytes(b"NOTIFY").unwrap();
    client
        .request(method, url)
        .header("Content-Type", "text/xml")
}

#[tokio::test]
async fn test_notify_is_acknowledged_and_forwarded() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let response = notify(&client, server.base_url())
        .header("SID", "uuid:RINCON_000E58A0123401400_sub0000000123")
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .header("SEQ", "7")
        .body(EVENT_XML)
        .send()
        .await
        .expect("Failed to send NOTIFY");

    assert_eq!(response.status(), 200);

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");

    assert_eq!(
        notification.subscription_id,
        "uuid:RINCON_000E58A0123401400_sub0000000123"
    );
    assert_eq!(notification.seq, Some(7));
    assert!(notification.event_xml.contains("<TransportState>PLAYING</TransportState>"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_notify_without_nt_and_on_any_path() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let url = format!("{}some/deep/path", server.base_url());
    let response = notify(&client, &url)
        .header("SID", "uuid:never-subscribed")
        .body("<e:propertyset/>")
        .send()
        .await
        .unwrap();

    // Unknown SIDs are still acknowledged; filtering happens downstream
    assert_eq!(response.status(), 200);

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.subscription_id, "uuid:never-subscribed");
    assert_eq!(notification.seq, None);

    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_sid_is_rejected() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let response = notify(&client, server.base_url())
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .body(EVENT_XML)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 412);
    assert!(rx.try_recv().is_err());
    assert_eq!(server.router().routed_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_wrong_nts_is_rejected() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let response = notify(&client, server.base_url())
        .header("SID", "uuid:sub")
        .header("NT", "upnp:event")
        .header("NTS", "ssdp:alive")
        .body(EVENT_XML)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 412);
    assert!(rx.try_recv().is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_other_methods_are_not_allowed() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let response = client.get(server.base_url()).send().await.unwrap();
    assert_eq!(response.status(), 405);

    let response = client
        .post(server.base_url())
        .header("SID", "uuid:sub")
        .body(EVENT_XML)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    assert!(rx.try_recv().is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_notifications() {
    let (server, mut rx) = start_server().await;
    let client = reqwest::Client::new();

    let requests = (0..10).map(|i| {
        notify(&client, server.base_url())
            .header("SID", format!("uuid:sub-{i}"))
            .header("SEQ", i.to_string())
            .body(EVENT_XML)
            .send()
    });

    for response in futures_join_all(requests).await {
        assert_eq!(response.unwrap().status(), 200);
    }

    let mut seen = Vec::new();
    for _ in 0..10 {
        let notification = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(notification.seq.unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<u32>>());

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (server, _rx) = start_server().await;
    let url = server.base_url().to_string();

    server.shutdown().await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let result = notify(&client, &url).header("SID", "uuid:late").send().await;
    assert!(result.is_err());
}

/// Drive a batch of request futures to completion concurrently.
async fn futures_join_all<F, T>(futures: impl Iterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
