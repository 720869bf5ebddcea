//! Core types for the sonos-stream crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sonos_discovery::{DeviceDescriptor, ServiceDescriptor};

/// The services a ZonePlayer subscription covers.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ServiceTag {
    /// DeviceProperties on the root device
    DeviceProperties,
    /// ZoneGroupTopology on the root device
    ZoneTopology,
    /// AVTransport on the media renderer
    AvTransport,
    /// Queue on the media renderer
    Queue,
    /// RenderingControl on the media renderer
    Rendering,
    /// GroupRenderingControl on the media renderer
    GroupRendering,
}

impl ServiceTag {
    /// Every tag, in the order subscriptions are issued.
    pub const ALL: [ServiceTag; 6] = [
        ServiceTag::DeviceProperties,
        ServiceTag::ZoneTopology,
        ServiceTag::AvTransport,
        ServiceTag::Queue,
        ServiceTag::Rendering,
        ServiceTag::GroupRendering,
    ];

    /// Short name used in logs and event filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTag::DeviceProperties => "deviceProperties",
            ServiceTag::ZoneTopology => "zoneTopology",
            ServiceTag::AvTransport => "avt",
            ServiceTag::Queue => "queue",
            ServiceTag::Rendering => "rendering",
            ServiceTag::GroupRendering => "groupRendering",
        }
    }

    /// Normalized type name of the sub-device holding the service, `None`
    /// for services on the root device.
    pub fn device_type_name(&self) -> Option<&'static str> {
        match self {
            ServiceTag::DeviceProperties | ServiceTag::ZoneTopology => None,
            _ => Some("mediaRenderer"),
        }
    }

    /// Normalized type name of the service.
    pub fn service_type_name(&self) -> &'static str {
        match self {
            ServiceTag::DeviceProperties => "deviceProperties",
            ServiceTag::ZoneTopology => "zoneGroupTopology",
            ServiceTag::AvTransport => "avTransport",
            ServiceTag::Queue => "queue",
            ServiceTag::Rendering => "renderingControl",
            ServiceTag::GroupRendering => "groupRenderingControl",
        }
    }

    /// Find this tag's service in a ZonePlayer tree.
    pub fn resolve(&self, zone_player: &DeviceDescriptor) -> Option<Arc<ServiceDescriptor>> {
        let device = match self.device_type_name() {
            Some(type_name) => zone_player.device(type_name)?,
            None => zone_player,
        };
        device.service(self.service_type_name()).cloned()
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a registered subscription.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Granted and being renewed
    Active,
    /// A renewal failed. Notifications may still arrive until the device
    /// expires it.
    Lapsed,
}

/// A GENA subscription held against one ZonePlayer service.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// SID assigned by the ZonePlayer
    pub subscription_id: String,
    /// UDN of the root ZonePlayer
    pub zone_player_udn: String,
    pub service_tag: ServiceTag,
    pub service: Arc<ServiceDescriptor>,
    /// Timeout granted by the last successful SUBSCRIBE or renewal
    pub granted_timeout: Duration,
    pub state: SubscriptionState,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }
}

/// Emitted once per service successfully subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfirmation {
    pub zp_udn: String,
    pub service_tag: ServiceTag,
    pub subscription_id: String,
}

/// A decoded state-change notification, attributed to its subscription.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// UDN of the ZonePlayer that sent the event
    pub zp_udn: String,
    pub service_tag: ServiceTag,
    pub service: Arc<ServiceDescriptor>,
    pub subscription_id: String,
    /// GENA `SEQ` header, when present
    pub seq: Option<u32>,
    /// State variable name to value. Repeated variables keep the last value.
    pub data: HashMap<String, String>,
}

impl NotificationEvent {
    /// Value of a state variable.
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.data.get(variable).map(String::as_str)
    }
}
