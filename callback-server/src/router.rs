//! Forwarding of received notifications.
//!
//! The router does not know which subscription IDs are live. It hands every
//! well-formed NOTIFY to a channel and leaves correlation to the consumer, so
//! the HTTP layer can acknowledge a notification before anyone decodes it.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// An undecoded UPnP event notification.
///
/// Carries the `SID` header, the optional `SEQ` header and the raw
/// property-set body, with no device-specific context.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    /// The subscription ID from the `SID` header
    pub subscription_id: String,
    /// Event sequence number from the `SEQ` header
    pub seq: Option<u32>,
    /// The raw XML event body
    pub event_xml: String,
}

/// Forwards notifications from HTTP callbacks to a channel.
///
/// # Example
///
/// ```
/// use tokio::sync::mpsc;
/// use callback_server::{EventRouter, NotificationPayload};
///
/// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
/// let router = EventRouter::new(tx);
///
/// assert!(router.route(NotificationPayload {
///     subscription_id: "uuid:sub-1".to_string(),
///     seq: Some(0),
///     event_xml: "<e:propertyset/>".to_string(),
/// }));
/// assert_eq!(rx.try_recv().unwrap().subscription_id, "uuid:sub-1");
/// ```
#[derive(Debug)]
pub struct EventRouter {
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
    routed: AtomicU64,
}

impl EventRouter {
    /// Create a router that forwards to `event_sender`.
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            event_sender,
            routed: AtomicU64::new(0),
        }
    }

    /// Forward a notification.
    ///
    /// Returns `false` if the receiving side has gone away.
    pub fn route(&self, payload: NotificationPayload) -> bool {
        match self.event_sender.send(payload) {
            Ok(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::warn!(sid = %e.0.subscription_id, "notification receiver closed, dropping event");
                false
            }
        }
    }

    /// Number of notifications forwarded so far.
    pub fn routed_count(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }
}
