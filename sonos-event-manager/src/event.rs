//! Events delivered through [`EventManagerIterator`](crate::EventManagerIterator)

use std::sync::Arc;

use sonos_discovery::DeviceDescriptor;
use sonos_stream::{NotificationEvent, SubscriptionConfirmation};

/// Everything the background worker reports to the sync side
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A ZonePlayer answered a search and its description was resolved
    DeviceDiscovered(Arc<DeviceDescriptor>),

    /// A service on a ZonePlayer accepted a subscription
    Subscribed(SubscriptionConfirmation),

    /// A property change notification from a subscribed service
    Notification(Arc<NotificationEvent>),
}

impl ManagerEvent {
    /// UDN of the ZonePlayer this event concerns
    pub fn zp_udn(&self) -> &str {
        match self {
            ManagerEvent::DeviceDiscovered(device) => &device.udn,
            ManagerEvent::Subscribed(confirmation) => &confirmation.zp_udn,
            ManagerEvent::Notification(event) => &event.zp_udn,
        }
    }
}
