//! Fan-out of decoded notifications to any number of consumers.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::{NotificationEvent, ServiceTag};

/// Broadcast hub fed by the callback dispatcher.
///
/// Each [`EventSubscriber`] is an independent view with its own buffer
/// position. Subscribers only see events published after they attach.
#[derive(Debug, Clone)]
pub struct EventMultiplexer {
    sender: broadcast::Sender<Arc<NotificationEvent>>,
}

impl EventMultiplexer {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every attached view.
    ///
    /// Returns the number of views that received it.
    pub(crate) fn publish(&self, event: NotificationEvent) -> usize {
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    /// View of every event.
    pub fn subscribe(&self) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::default())
    }

    /// View restricted by `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Number of attached views.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Restricts a view to one ZonePlayer and/or one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub zp_udn: Option<String>,
    pub service_tag: Option<ServiceTag>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone_player(mut self, udn: impl Into<String>) -> Self {
        self.zp_udn = Some(udn.into());
        self
    }

    pub fn service(mut self, tag: ServiceTag) -> Self {
        self.service_tag = Some(tag);
        self
    }

    pub fn matches(&self, event: &NotificationEvent) -> bool {
        self.zp_udn.as_deref().map_or(true, |udn| udn == event.zp_udn)
            && self.service_tag.map_or(true, |tag| tag == event.service_tag)
    }
}

/// One consumer's view of the event stream.
#[derive(Debug)]
pub struct EventSubscriber {
    receiver: broadcast::Receiver<Arc<NotificationEvent>>,
    filter: EventFilter,
}

impl EventSubscriber {
    /// Next matching event, or `None` once the multiplexer is gone.
    ///
    /// A view that falls behind skips the events it missed and logs how many.
    pub async fn recv(&mut self) -> Option<Arc<NotificationEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, skipping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<NotificationEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, skipping missed events");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<NotificationEvent>> {
        futures::stream::unfold(self, |mut subscriber| async move {
            subscriber.recv().await.map(|event| (event, subscriber))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use sonos_discovery::ServiceDescriptor;
    use std::collections::HashMap;

    fn event(udn: &str, tag: ServiceTag, seq: u32) -> NotificationEvent {
        NotificationEvent {
            zp_udn: udn.to_string(),
            service_tag: tag,
            service: Arc::new(ServiceDescriptor {
                service_type: String::new(),
                service_id: String::new(),
                control_url: String::new(),
                event_sub_url: String::new(),
                scpd_url: String::new(),
                host_url: "192.168.1.10:1400".to_string(),
                description: None,
            }),
            subscription_id: format!("uuid:{udn}-{tag}"),
            seq: Some(seq),
            data: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_filtered_views_are_independent() {
        let mux = EventMultiplexer::new(16);
        let mut all = mux.subscribe();
        let mut kitchen = mux.subscribe_filtered(EventFilter::new().zone_player("uuid:KITCHEN"));
        let mut volume = mux.subscribe_filtered(
            EventFilter::new()
                .zone_player("uuid:KITCHEN")
                .service(ServiceTag::Rendering),
        );

        assert_eq!(mux.publish(event("uuid:LIVING", ServiceTag::Rendering, 0)), 3);
        mux.publish(event("uuid:KITCHEN", ServiceTag::AvTransport, 1));
        mux.publish(event("uuid:KITCHEN", ServiceTag::Rendering, 2));

        assert_eq!(all.recv().await.unwrap().seq, Some(0));
        assert_eq!(all.recv().await.unwrap().seq, Some(1));
        assert_eq!(all.recv().await.unwrap().seq, Some(2));

        assert_eq!(kitchen.recv().await.unwrap().seq, Some(1));
        assert_eq!(kitchen.recv().await.unwrap().seq, Some(2));

        assert_eq!(volume.recv().await.unwrap().seq, Some(2));
        assert!(volume.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagging_view_continues() {
        let mux = EventMultiplexer::new(2);
        let mut slow = mux.subscribe();

        for seq in 0..5 {
            mux.publish(event("uuid:A", ServiceTag::Queue, seq));
        }

        // Oldest events were overwritten; the view resumes at the oldest kept
        assert_eq!(slow.recv().await.unwrap().seq, Some(3));
        assert_eq!(slow.recv().await.unwrap().seq, Some(4));
    }

    #[tokio::test]
    async fn test_no_replay_and_close() {
        let mux = EventMultiplexer::new(4);
        assert_eq!(mux.publish(event("uuid:A", ServiceTag::Queue, 0)), 0);

        let subscriber = mux.subscribe();
        mux.publish(event("uuid:A", ServiceTag::Queue, 1));
        drop(mux);

        let seqs: Vec<_> = subscriber.into_stream().map(|e| e.seq).collect().await;
        assert_eq!(seqs, vec![Some(1)]);
    }
}
