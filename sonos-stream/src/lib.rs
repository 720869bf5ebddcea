//! # sonos-stream
//!
//! GENA event subscriptions for Sonos ZonePlayers.
//!
//! Given a [`DeviceDescriptor`](sonos_discovery::DeviceDescriptor) from
//! discovery, the [`SubscriptionManager`] subscribes to the player's eventing
//! services, renews each subscription shortly before it expires, and turns
//! incoming NOTIFY requests into [`NotificationEvent`]s attributed to the
//! ZonePlayer and service they came from.
//!
//! The pieces:
//!
//! - [`SubscriptionManager`]: SUBSCRIBE fan-out, renewal timers, shutdown
//! - [`SubscriptionRegistry`]: SID to subscription map used to correlate
//!   notifications
//! - [`EventMultiplexer`]: broadcast of decoded events with filtered views
//! - [`GenaTransport`]: the HTTP seam, implemented by [`HttpGenaClient`]

mod config;
mod error;
pub mod events;
mod gena;
mod listener;
mod manager;
mod registry;
mod renewal;
mod types;

#[cfg(test)]
mod testing;

pub use config::StreamConfig;
pub use error::{Result, StreamError, SubscriptionError};
pub use events::{decode_property_set, EventFilter, EventMultiplexer, EventSubscriber};
pub use gena::{parse_timeout, GenaGrant, GenaTransport, HttpGenaClient};
pub use manager::{ConfirmationStream, SubscriptionManager};
pub use registry::SubscriptionRegistry;
pub use types::{
    NotificationEvent, ServiceTag, Subscription, SubscriptionConfirmation, SubscriptionState,
};
