//! SSDP prober: searches for ZonePlayers and resolves their descriptions.
//!
//! A search works in three steps:
//! 1. Send one M-SEARCH from an ephemeral UDP socket
//! 2. Collect replies on that socket until the search window closes
//! 3. For every reply with an unseen `USN`, resolve the description in a
//!    background task and publish the normalized device
//!
//! The set of seen `USN`s only ever grows, so a device is resolved at most
//! once per prober no matter how many searches run or how often it answers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use futures::Stream;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::description::{host_url_from_location, DeviceDescriptor};
use crate::error::{DiscoveryError, Result};
use crate::scpd::ServiceDescription;
use crate::source::{DescriptionSource, HttpDescriptionSource};
use crate::ssdp::{build_msearch, SearchResponse};

const RECV_BUFFER_SIZE: usize = 2048;

/// Discovers ZonePlayers and publishes their normalized descriptions.
///
/// Cloning is cheap; clones share the seen-device registry and the discovery
/// stream.
///
/// # Example
///
/// ```no_run
/// use sonos_discovery::{DiscoveryConfig, Prober};
///
/// # async fn example() -> sonos_discovery::Result<()> {
/// let prober = Prober::new(DiscoveryConfig::default())?;
/// let mut stream = prober.discovery_stream();
///
/// prober.search().await?;
/// while let Some(zone_player) = stream.recv().await {
///     println!("{} at {}", zone_player.display_name(), zone_player.host_url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Prober {
    inner: Arc<ProberInner>,
}

struct ProberInner {
    config: DiscoveryConfig,
    source: Arc<dyn DescriptionSource>,
    /// USNs already handed to resolution
    seen: DashSet<String>,
    /// Published devices keyed by UDN
    devices: DashMap<String, Arc<DeviceDescriptor>>,
    sender: broadcast::Sender<Arc<DeviceDescriptor>>,
}

impl Prober {
    /// Create a prober that fetches descriptions over HTTP.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let source = HttpDescriptionSource::new(config.description_timeout)?;
        Self::with_source(config, Arc::new(source))
    }

    /// Create a prober with a custom description source.
    pub fn with_source(config: DiscoveryConfig, source: Arc<dyn DescriptionSource>) -> Result<Self> {
        config.validate()?;
        let (sender, _) = broadcast::channel(config.stream_capacity);

        Ok(Self {
            inner: Arc::new(ProberInner {
                config,
                source,
                seen: DashSet::new(),
                devices: DashMap::new(),
                sender,
            }),
        })
    }

    /// Subscribe to newly discovered devices.
    ///
    /// A stream only sees devices published after it was created; use
    /// [`devices`](Self::devices) for the ones found earlier.
    pub fn discovery_stream(&self) -> DiscoveryStream {
        DiscoveryStream {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Snapshot of every device published so far.
    pub fn devices(&self) -> Vec<Arc<DeviceDescriptor>> {
        self.inner
            .devices
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// A published device by UDN.
    pub fn device(&self, udn: &str) -> Option<Arc<DeviceDescriptor>> {
        self.inner.devices.get(udn).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a `USN` has already been handed to resolution.
    pub fn has_seen(&self, usn: &str) -> bool {
        self.inner.seen.contains(usn)
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    /// Send one M-SEARCH and process replies until the search window closes.
    ///
    /// Returns the number of previously unseen devices handed to resolution.
    /// Resolution continues in the background after this returns; results
    /// arrive on the [`discovery_stream`](Self::discovery_stream).
    pub async fn search(&self) -> Result<usize> {
        Ok(self.probe().await?.len())
    }

    /// Run a search and wait until every new device has been resolved.
    ///
    /// Returns every device published so far, including ones found by
    /// earlier searches.
    pub async fn search_and_wait(&self) -> Result<Vec<Arc<DeviceDescriptor>>> {
        for handle in self.probe().await? {
            if let Err(e) = handle.await {
                warn!(error = %e, "description task failed");
            }
        }
        Ok(self.devices())
    }

    async fn probe(&self) -> Result<Vec<JoinHandle<()>>> {
        let config = &self.inner.config;

        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| DiscoveryError::Transport(format!("Failed to bind UDP socket: {e}")))?;

        if config.multicast_addr.ip().is_multicast() {
            socket
                .set_multicast_ttl_v4(4)
                .map_err(|e| DiscoveryError::Transport(format!("Failed to set multicast TTL: {e}")))?;
        }

        let request = build_msearch(
            &config.search_target,
            config.mx,
            &config.multicast_addr.to_string(),
        );
        socket
            .send_to(request.as_bytes(), config.multicast_addr)
            .await
            .map_err(|e| DiscoveryError::Transport(format!("Failed to send M-SEARCH: {e}")))?;

        debug!(
            target_addr = %config.multicast_addr,
            st = %config.search_target,
            window = ?config.search_window,
            "M-SEARCH sent"
        );

        let deadline = Instant::now() + config.search_window;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut resolutions = Vec::new();

        loop {
            let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, "SSDP socket error, ending search early");
                    break;
                }
                Ok(Ok(received)) => received,
            };

            let text = String::from_utf8_lossy(&buffer[..len]);
            match SearchResponse::parse(&text) {
                Some(response) => resolutions.extend(self.handle_response(response)),
                None => trace!(%from, "ignoring datagram without USN/LOCATION"),
            }
        }

        drop(socket);
        info!(new_devices = resolutions.len(), "SSDP search window closed");

        Ok(resolutions)
    }

    /// Process one search reply.
    ///
    /// Marks the `USN` as seen and spawns description resolution if it was
    /// new. Returns the resolution task, or `None` for repeats.
    pub fn handle_response(&self, response: SearchResponse) -> Option<JoinHandle<()>> {
        let usn = response.usn()?.to_string();
        let location = response.location()?.to_string();

        if !self.inner.seen.insert(usn.clone()) {
            trace!(%usn, "already seen");
            return None;
        }

        debug!(%usn, %location, "new ZonePlayer reply");
        let prober = self.clone();
        Some(tokio::spawn(async move {
            prober.resolve(usn, location).await;
        }))
    }

    async fn resolve(&self, usn: String, location: String) {
        let timeout = self.inner.config.description_timeout;

        match tokio::time::timeout(timeout, self.describe(&location)).await {
            Ok(Ok(device)) => self.publish(device),
            Ok(Err(e)) => {
                warn!(%usn, %location, error = %e, "dropping device, description could not be resolved");
            }
            Err(_) => {
                warn!(%usn, %location, ?timeout, "dropping device, description timed out");
            }
        }
    }

    /// Fetch, parse and normalize the description at `location`.
    ///
    /// Service descriptions are attached when enabled in the configuration.
    pub async fn describe(&self, location: &str) -> Result<DeviceDescriptor> {
        let host_url = host_url_from_location(location)?;
        let xml = self.inner.source.fetch(location).await?;
        let mut device = DeviceDescriptor::from_xml(&xml, &host_url)?;

        if self.inner.config.fetch_service_descriptions {
            self.attach_service_descriptions(&mut device).await;
        }

        Ok(device)
    }

    async fn attach_service_descriptions(&self, device: &mut DeviceDescriptor) {
        let source = &self.inner.source;

        let fetches = device
            .all_services()
            .into_iter()
            .filter(|service| !service.scpd_url.is_empty())
            .map(|service| {
                let url = service.scpd_endpoint();
                async move {
                    let result = match source.fetch(&url).await {
                        Ok(xml) => ServiceDescription::from_xml(&xml),
                        Err(e) => Err(e),
                    };
                    (url, result)
                }
            });

        let results: HashMap<String, Result<ServiceDescription>> =
            join_all(fetches).await.into_iter().collect();

        for service in device.all_services_mut() {
            if service.scpd_url.is_empty() {
                continue;
            }
            let url = service.scpd_endpoint();
            match results.get(&url) {
                Some(Ok(description)) => {
                    Arc::make_mut(service).description = Some(description.clone());
                }
                Some(Err(e)) => {
                    warn!(%url, error = %e, "service description unavailable");
                }
                None => {}
            }
        }
    }

    fn publish(&self, device: DeviceDescriptor) {
        let device = Arc::new(device);
        info!(
            udn = %device.udn,
            name = device.display_name(),
            host = %device.host_url,
            "discovered ZonePlayer"
        );

        self.inner
            .devices
            .insert(device.udn.clone(), Arc::clone(&device));

        // Fails only when nobody is listening
        let _ = self.inner.sender.send(device);
    }
}

/// Receiver side of [`Prober::discovery_stream`].
pub struct DiscoveryStream {
    receiver: broadcast::Receiver<Arc<DeviceDescriptor>>,
}

impl DiscoveryStream {
    /// Wait for the next discovered device.
    ///
    /// Returns `None` once every [`Prober`] clone has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<DeviceDescriptor>> {
        loop {
            match self.receiver.recv().await {
                Ok(device) => return Some(device),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "discovery stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next device if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Arc<DeviceDescriptor>> {
        loop {
            match self.receiver.try_recv() {
                Ok(device) => return Some(device),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "discovery stream lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Arc<DeviceDescriptor>> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.recv().await.map(|device| (device, stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DESCRIPTION: &str = include_str!("../tests/fixtures/zoneplayer_description.xml");
    const SCPD: &str = include_str!("../tests/fixtures/rendering_control_scpd.xml");
    const LOCATION: &str = "http://192.168.1.10:1400/xml/device_description.xml";

    /// Serves documents from a map and counts fetches.
    struct MapSource {
        documents: HashMap<String, String>,
        fetches: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MapSource {
        fn new(documents: &[(&str, &str)]) -> Self {
            Self {
                documents: documents
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl DescriptionSource for MapSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| DiscoveryError::Transport(format!("GET {url} returned HTTP 404")))
        }
    }

    fn reply(usn: &str, location: &str) -> SearchResponse {
        SearchResponse::parse(&format!(
            "HTTP/1.1 200 OK\r\nLOCATION: {location}\r\nST: urn:schemas-upnp-org:device:ZonePlayer:1\r\nUSN: {usn}\r\n\r\n"
        ))
        .unwrap()
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig::default().with_service_descriptions(false)
    }

    #[tokio::test]
    async fn test_unseen_usn_fetches_once() {
        let source = Arc::new(MapSource::new(&[(LOCATION, DESCRIPTION)]));
        let prober = Prober::with_source(config(), source.clone()).unwrap();
        let mut stream = prober.discovery_stream();

        let handle = prober
            .handle_response(reply("uuid:RINCON_000E58A0123401400::urn:schemas-upnp-org:device:ZonePlayer:1", LOCATION))
            .unwrap();
        handle.await.unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        let device = stream.recv().await.unwrap();
        assert_eq!(device.udn, "uuid:RINCON_000E58A0123401400");
        assert_eq!(device.host_url, "192.168.1.10:1400");
    }

    #[tokio::test]
    async fn test_seen_usn_is_not_fetched_again() {
        let source = Arc::new(MapSource::new(&[(LOCATION, DESCRIPTION)]));
        let prober = Prober::with_source(config(), source.clone()).unwrap();
        let mut stream = prober.discovery_stream();

        let usn = "uuid:RINCON_000E58A0123401400::urn:schemas-upnp-org:device:ZonePlayer:1";
        prober.handle_response(reply(usn, LOCATION)).unwrap().await.unwrap();

        assert!(prober.has_seen(usn));
        assert!(prober.handle_response(reply(usn, LOCATION)).is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        assert!(stream.recv().await.is_some());
        assert!(stream.try_recv().is_none());
        assert_eq!(prober.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_drops_device() {
        let source = Arc::new(MapSource::new(&[]));
        let prober = Prober::with_source(config(), source.clone()).unwrap();
        let mut stream = prober.discovery_stream();

        let usn = "uuid:RINCON_GONE::urn:schemas-upnp-org:device:ZonePlayer:1";
        prober.handle_response(reply(usn, LOCATION)).unwrap().await.unwrap();

        assert!(stream.try_recv().is_none());
        assert!(prober.devices().is_empty());
        // The USN stays marked
        assert!(prober.handle_response(reply(usn, LOCATION)).is_none());
    }

    #[tokio::test]
    async fn test_resolution_timeout_drops_device() {
        let mut source = MapSource::new(&[(LOCATION, DESCRIPTION)]);
        source.delay = Some(Duration::from_secs(30));
        let prober = Prober::with_source(
            config().with_description_timeout(Duration::from_millis(50)),
            Arc::new(source),
        )
        .unwrap();

        prober
            .handle_response(reply("uuid:RINCON_SLOW::x", LOCATION))
            .unwrap()
            .await
            .unwrap();

        assert!(prober.devices().is_empty());
    }

    #[tokio::test]
    async fn test_stream_does_not_replay() {
        let source = Arc::new(MapSource::new(&[(LOCATION, DESCRIPTION)]));
        let prober = Prober::with_source(config(), source).unwrap();

        prober
            .handle_response(reply("uuid:RINCON_A::x", LOCATION))
            .unwrap()
            .await
            .unwrap();

        let mut late = prober.discovery_stream();
        assert!(late.try_recv().is_none());
        assert!(prober.device("uuid:RINCON_000E58A0123401400").is_some());
    }

    #[tokio::test]
    async fn test_service_descriptions_attached() {
        let source = Arc::new(MapSource::new(&[
            (LOCATION, DESCRIPTION),
            ("http://192.168.1.10:1400/xml/RenderingControl1.xml", SCPD),
        ]));
        let prober = Prober::with_source(
            DiscoveryConfig::default().with_service_descriptions(true),
            source.clone(),
        )
        .unwrap();

        let device = prober.describe(LOCATION).await.unwrap();

        // One description plus eight services
        assert_eq!(source.fetches.load(Ordering::SeqCst), 9);

        let renderer = device.device("mediaRenderer").unwrap();
        let rendering = renderer.service("renderingControl").unwrap();
        let description = rendering.description.as_ref().unwrap();
        assert!(description.action("GetVolume").is_some());

        // Missing SCPD documents leave the description empty
        assert!(renderer.service("avTransport").unwrap().description.is_none());
    }
}
