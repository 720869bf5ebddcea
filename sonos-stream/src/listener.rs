//! Callback listener and notification dispatch.
//!
//! Wraps a [`CallbackServer`] and a dispatcher task that correlates each
//! notification with the subscription registry, decodes it and publishes it
//! on the multiplexer.

use std::collections::HashMap;
use std::time::Duration;

use callback_server::{CallbackConfig, CallbackServer, NotificationPayload};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::Result;
use crate::events::{decode_property_set, EventMultiplexer};
use crate::registry::SubscriptionRegistry;
use crate::types::{NotificationEvent, Subscription};

/// The HTTP endpoint every subscription of one manager points at.
pub(crate) struct CallbackListener {
    callback_url: String,
    server: Mutex<Option<CallbackServer>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackListener {
    pub async fn start(
        config: &StreamConfig,
        registry: SubscriptionRegistry,
        multiplexer: EventMultiplexer,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (start, end) = config.callback_port_range;
        let mut callback_config = CallbackConfig::default().with_port_range(start, end);
        if let Some(ip) = config.advertised_ip {
            callback_config = callback_config.with_advertised_ip(ip);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let server = CallbackServer::start(callback_config, sender).await?;
        let callback_url = server.base_url().to_string();

        let dispatcher = Dispatcher {
            registry,
            multiplexer,
            grace: config.notification_grace_period,
            cancel,
        };
        let handle = tokio::spawn(dispatcher.run(receiver));

        info!(%callback_url, "callback listener started");

        Ok(Self {
            callback_url,
            server: Mutex::new(Some(server)),
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Stop the HTTP server and wait for the dispatcher to drain.
    pub async fn shutdown(&self) {
        if let Some(server) = self.server.lock().await.take() {
            server.shutdown().await;
        }
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[derive(Clone)]
struct Dispatcher {
    registry: SubscriptionRegistry,
    multiplexer: EventMultiplexer,
    grace: Duration,
    cancel: CancellationToken,
}

impl Dispatcher {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<NotificationPayload>) {
        // Notifications for SIDs not yet in the registry, in arrival order
        let mut held: HashMap<String, Vec<NotificationPayload>> = HashMap::new();
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<String>();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                payload = receiver.recv() => match payload {
                    Some(payload) => self.dispatch(payload, &mut held, &ready_tx),
                    None => break,
                },
                Some(sid) = ready_rx.recv() => self.release_held(&sid, &mut held),
            }
        }
        debug!("notification dispatcher stopped");
    }

    fn dispatch(
        &self,
        payload: NotificationPayload,
        held: &mut HashMap<String, Vec<NotificationPayload>>,
        ready: &mpsc::UnboundedSender<String>,
    ) {
        let sid = payload.subscription_id.clone();

        // Queue behind earlier notifications still waiting for this SID
        if let Some(queue) = held.get_mut(&sid) {
            queue.push(payload);
            if self.registry.contains(&sid) {
                self.release_held(&sid, held);
            }
            return;
        }

        match self.registry.get(&sid) {
            Some(subscription) => self.deliver(&subscription, payload),
            None => {
                held.insert(sid.clone(), vec![payload]);
                self.await_registration(sid, ready.clone());
            }
        }
    }

    /// The first NOTIFY can beat the registry insert for its SUBSCRIBE.
    /// Signals `ready` once the SID is registered or the grace period ends.
    fn await_registration(&self, sid: String, ready: mpsc::UnboundedSender<String>) {
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        let deadline = Instant::now() + self.grace;

        tokio::spawn(async move {
            loop {
                let inserted = registry.inserted();
                if registry.contains(&sid) {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = inserted => {}
                }
            }
            let _ = ready.send(sid);
        });
    }

    fn release_held(&self, sid: &str, held: &mut HashMap<String, Vec<NotificationPayload>>) {
        let Some(queue) = held.remove(sid) else {
            return;
        };

        match self.registry.get(sid) {
            Some(subscription) => {
                for payload in queue {
                    self.deliver(&subscription, payload);
                }
            }
            None => {
                warn!(sid, dropped = queue.len(), "dropping notifications for unknown subscription");
            }
        }
    }

    fn deliver(&self, subscription: &Subscription, payload: NotificationPayload) {
        let data = match decode_property_set(&payload.event_xml) {
            Ok(data) => data,
            Err(e) => {
                warn!(sid = %payload.subscription_id, error = %e, "dropping undecodable notification");
                return;
            }
        };

        debug!(
            sid = %payload.subscription_id,
            zp_udn = %subscription.zone_player_udn,
            service = %subscription.service_tag,
            seq = ?payload.seq,
            variables = data.len(),
            "notification received"
        );

        self.multiplexer.publish(NotificationEvent {
            zp_udn: subscription.zone_player_udn.clone(),
            service_tag: subscription.service_tag,
            service: subscription.service.clone(),
            subscription_id: payload.subscription_id,
            seq: payload.seq,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServiceTag, SubscriptionState};
    use sonos_discovery::ServiceDescriptor;
    use std::sync::Arc;

    const BODY: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
        <e:property><Volume>30</Volume></e:property>
        <e:property><Mute>1</Mute></e:property>
    </e:propertyset>"#;

    fn subscription(sid: &str) -> Subscription {
        Subscription {
            subscription_id: sid.to_string(),
            zone_player_udn: "uuid:RINCON_000E58A0123401400".to_string(),
            service_tag: ServiceTag::Rendering,
            service: Arc::new(ServiceDescriptor {
                service_type: "urn:schemas-upnp-org:service:RenderingControl:1".to_string(),
                service_id: "urn:upnp-org:serviceId:RenderingControl".to_string(),
                control_url: "/MediaRenderer/RenderingControl/Control".to_string(),
                event_sub_url: "/MediaRenderer/RenderingControl/Event".to_string(),
                scpd_url: "/xml/RenderingControl1.xml".to_string(),
                host_url: "192.168.1.10:1400".to_string(),
                description: None,
            }),
            granted_timeout: Duration::from_secs(1800),
            state: SubscriptionState::Active,
        }
    }

    fn payload(sid: &str, seq: u32) -> NotificationPayload {
        NotificationPayload {
            subscription_id: sid.to_string(),
            seq: Some(seq),
            event_xml: BODY.to_string(),
        }
    }

    fn dispatcher(registry: &SubscriptionRegistry, multiplexer: &EventMultiplexer) -> Dispatcher {
        Dispatcher {
            registry: registry.clone(),
            multiplexer: multiplexer.clone(),
            grace: Duration::from_millis(500),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_sid_is_published_with_identity() {
        let registry = SubscriptionRegistry::new();
        let multiplexer = EventMultiplexer::new(16);
        let mut events = multiplexer.subscribe();
        registry.insert(subscription("uuid:sub-1"));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(&registry, &multiplexer).run(rx));
        tx.send(payload("uuid:sub-1", 4)).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.zp_udn, "uuid:RINCON_000E58A0123401400");
        assert_eq!(event.service_tag, ServiceTag::Rendering);
        assert_eq!(event.subscription_id, "uuid:sub-1");
        assert_eq!(event.seq, Some(4));
        assert_eq!(event.get("Volume"), Some("30"));
        assert_eq!(event.get("Mute"), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sid_is_dropped_after_grace() {
        let registry = SubscriptionRegistry::new();
        let multiplexer = EventMultiplexer::new(16);
        let mut events = multiplexer.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(&registry, &multiplexer).run(rx));
        tx.send(payload("uuid:stranger", 0)).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(events.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_notification_delivered_within_grace() {
        let registry = SubscriptionRegistry::new();
        let multiplexer = EventMultiplexer::new(16);
        let mut events = multiplexer.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(&registry, &multiplexer).run(rx));
        tx.send(payload("uuid:sub-early", 0)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.insert(subscription("uuid:sub-early"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.subscription_id, "uuid:sub-early");
        assert_eq!(event.seq, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_notifications_keep_sequence_order() {
        let registry = SubscriptionRegistry::new();
        let multiplexer = EventMultiplexer::new(16);
        let mut events = multiplexer.subscribe();
        let started = Instant::now();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(&registry, &multiplexer).run(rx));
        tx.send(payload("uuid:sub-late", 0)).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.insert(subscription("uuid:sub-late"));
        tx.send(payload("uuid:sub-late", 1)).unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.seq, Some(0));
        assert_eq!(second.seq, Some(1));

        // Released by the insert, not by the grace deadline
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_body_is_dropped() {
        let registry = SubscriptionRegistry::new();
        let multiplexer = EventMultiplexer::new(16);
        let mut events = multiplexer.subscribe();
        registry.insert(subscription("uuid:sub-1"));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(&registry, &multiplexer).run(rx));
        tx.send(NotificationPayload {
            subscription_id: "uuid:sub-1".to_string(),
            seq: None,
            event_xml: "<html>oops</html>".to_string(),
        })
        .unwrap();
        tx.send(payload("uuid:sub-1", 1)).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.seq, Some(1));
    }
}
