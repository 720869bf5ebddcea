//! Subscription manager: SUBSCRIBE fan-out, renewal and shutdown.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use futures::Stream;
use sonos_discovery::{DeviceDescriptor, ServiceDescriptor};
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::events::{EventFilter, EventMultiplexer, EventSubscriber};
use crate::gena::{GenaTransport, HttpGenaClient};
use crate::listener::CallbackListener;
use crate::registry::SubscriptionRegistry;
use crate::renewal::Renewer;
use crate::types::{ServiceTag, Subscription, SubscriptionConfirmation, SubscriptionState};

/// Maintains GENA subscriptions against ZonePlayers and delivers their
/// notifications as one multiplexed stream.
///
/// The callback listener is started by the first [`subscribe`] call and
/// shared by every subscription afterwards. Cloning the manager is cheap and
/// all clones share state.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use sonos_stream::{StreamConfig, SubscriptionManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = SubscriptionManager::new(StreamConfig::default())?;
/// let mut events = manager.events();
///
/// for device in sonos_discovery::discover().await? {
///     let confirmations: Vec<_> = manager.subscribe(&device).await?.collect().await;
///     println!("{}: {} services", device.display_name(), confirmations.len());
/// }
///
/// while let Some(event) = events.recv().await {
///     println!("{} {} {:?}", event.zp_udn, event.service_tag, event.data);
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`subscribe`]: SubscriptionManager::subscribe
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<StreamConfig>,
    transport: Arc<dyn GenaTransport>,
    registry: SubscriptionRegistry,
    multiplexer: EventMultiplexer,
    listener: OnceCell<CallbackListener>,
    cancel: CancellationToken,
}

impl SubscriptionManager {
    /// Create a manager that talks GENA over HTTP.
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpGenaClient::new(config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a manager with a custom GENA transport.
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn GenaTransport>) -> Result<Self> {
        config.validate()?;
        let multiplexer = EventMultiplexer::new(config.event_buffer_size);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config: Arc::new(config),
                transport,
                registry: SubscriptionRegistry::new(),
                multiplexer,
                listener: OnceCell::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Read-only view of the live subscriptions.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn multiplexer(&self) -> &EventMultiplexer {
        &self.inner.multiplexer
    }

    /// Stream of every notification received from now on.
    pub fn events(&self) -> EventSubscriber {
        self.inner.multiplexer.subscribe()
    }

    /// Stream of notifications matching `filter`.
    pub fn events_filtered(&self, filter: EventFilter) -> EventSubscriber {
        self.inner.multiplexer.subscribe_filtered(filter)
    }

    /// `CALLBACK` URL in use, once the listener has started.
    pub fn callback_url(&self) -> Option<&str> {
        self.inner.listener.get().map(CallbackListener::callback_url)
    }

    /// Subscribe to every eventing service of a ZonePlayer.
    ///
    /// One SUBSCRIBE is issued per [`ServiceTag`] the device exposes; tags
    /// it lacks are skipped, as are tags already subscribed for this device.
    /// The returned stream yields one confirmation per service that
    /// succeeded and ends once every request has finished. A failing service
    /// is logged and does not affect the others.
    ///
    /// Fails when the callback listener cannot be started or the manager
    /// has been shut down.
    pub async fn subscribe(&self, zone_player: &DeviceDescriptor) -> Result<ConfirmationStream> {
        if self.inner.cancel.is_cancelled() {
            return Err(StreamError::ShutDown);
        }

        let listener = self.listener().await?;
        let callback_url = listener.callback_url().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        for tag in ServiceTag::ALL {
            let Some(service) = tag.resolve(zone_player) else {
                debug!(zp_udn = %zone_player.udn, service = %tag, "service not offered, skipping");
                continue;
            };
            if !self.inner.registry.reserve(&zone_player.udn, tag) {
                debug!(zp_udn = %zone_player.udn, service = %tag, "already subscribed or in flight");
                continue;
            }

            let request = SubscribeRequest {
                zp_udn: zone_player.udn.clone(),
                tag,
                service,
                callback_url: callback_url.clone(),
            };
            tokio::spawn(self.clone().subscribe_service(request, sender.clone()));
        }

        Ok(ConfirmationStream { receiver })
    }

    /// Remove and UNSUBSCRIBE every subscription held for one ZonePlayer.
    ///
    /// Returns how many subscriptions were removed.
    pub async fn unsubscribe(&self, zp_udn: &str) -> usize {
        let removed: Vec<Subscription> = self
            .inner
            .registry
            .for_zone_player(zp_udn)
            .into_iter()
            .filter_map(|subscription| self.inner.registry.remove(&subscription.subscription_id))
            .collect();

        self.unsubscribe_all(&removed).await;
        removed.len()
    }

    /// Cancel all renewals, UNSUBSCRIBE everything, clear the registry and
    /// stop the callback listener.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let removed = self.inner.registry.drain();
        self.unsubscribe_all(&removed).await;

        if let Some(listener) = self.inner.listener.get() {
            listener.shutdown().await;
        }

        info!(unsubscribed = removed.len(), "subscription manager shut down");
    }

    async fn listener(&self) -> Result<&CallbackListener> {
        self.inner
            .listener
            .get_or_try_init(|| {
                CallbackListener::start(
                    &self.inner.config,
                    self.inner.registry.clone(),
                    self.inner.multiplexer.clone(),
                    self.inner.cancel.child_token(),
                )
            })
            .await
    }

    fn renewer(&self) -> Renewer {
        Renewer {
            transport: Arc::clone(&self.inner.transport),
            registry: self.inner.registry.clone(),
            config: Arc::clone(&self.inner.config),
            cancel: self.inner.cancel.child_token(),
        }
    }

    async fn subscribe_service(
        self,
        request: SubscribeRequest,
        confirmations: mpsc::UnboundedSender<SubscriptionConfirmation>,
    ) {
        let SubscribeRequest {
            zp_udn,
            tag,
            service,
            callback_url,
        } = request;

        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => None,
            result = self.inner.transport.subscribe(&service, &callback_url, self.inner.config.subscription_timeout) => Some(result),
        };

        let grant = match result {
            Some(Ok(grant)) => grant,
            Some(Err(e)) => {
                warn!(%zp_udn, service = %tag, url = %service.event_endpoint(), error = %e, "subscription failed");
                self.inner.registry.release(&zp_udn, tag);
                return;
            }
            None => {
                self.inner.registry.release(&zp_udn, tag);
                return;
            }
        };

        // Shutdown drained the registry while this request was in flight
        if self.inner.cancel.is_cancelled() {
            self.inner.registry.release(&zp_udn, tag);
            let _ = self.inner.transport.unsubscribe(&service, &grant.sid).await;
            return;
        }

        self.inner.registry.insert(Subscription {
            subscription_id: grant.sid.clone(),
            zone_player_udn: zp_udn.clone(),
            service_tag: tag,
            service,
            granted_timeout: grant.timeout,
            state: SubscriptionState::Active,
        });
        self.inner.registry.release(&zp_udn, tag);
        self.renewer().spawn(grant.sid.clone(), grant.timeout);

        info!(%zp_udn, service = %tag, sid = %grant.sid, timeout = grant.timeout.as_secs(), "subscribed");

        let _ = confirmations.send(SubscriptionConfirmation {
            zp_udn,
            service_tag: tag,
            subscription_id: grant.sid,
        });
    }

    async fn unsubscribe_all(&self, subscriptions: &[Subscription]) {
        let transport = &self.inner.transport;
        let requests = subscriptions.iter().map(|subscription| async move {
            if let Err(e) = transport
                .unsubscribe(&subscription.service, &subscription.subscription_id)
                .await
            {
                debug!(sid = %subscription.subscription_id, error = %e, "UNSUBSCRIBE failed");
            }
        });
        join_all(requests).await;
    }
}

struct SubscribeRequest {
    zp_udn: String,
    tag: ServiceTag,
    service: Arc<ServiceDescriptor>,
    callback_url: String,
}

/// Confirmations from one [`SubscriptionManager::subscribe`] call.
///
/// Ends once every SUBSCRIBE issued by the call has completed.
#[derive(Debug)]
pub struct ConfirmationStream {
    receiver: mpsc::UnboundedReceiver<SubscriptionConfirmation>,
}

impl ConfirmationStream {
    pub async fn recv(&mut self) -> Option<SubscriptionConfirmation> {
        self.receiver.recv().await
    }
}

impl Stream for ConfirmationStream {
    type Item = SubscriptionConfirmation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
