//! # Sonos Event Manager
//!
//! A sync-first facade that discovers ZonePlayers and keeps their services
//! subscribed, without exposing async/await to the caller.
//!
//! ## Overview
//!
//! A background worker thread owns a tokio runtime, an SSDP
//! [`Prober`](sonos_discovery::Prober) and a
//! [`SubscriptionManager`](sonos_stream::SubscriptionManager). It searches
//! on an interval, subscribes newly discovered players and forwards
//! everything that happens to a blocking [`EventManagerIterator`].
//!
//! ## Usage
//!
//! ```no_run
//! use sonos_event_manager::prelude::*;
//!
//! let manager = SonosEventManager::new()?;
//!
//! for event in manager.iter() {
//!     if let ManagerEvent::Notification(event) = event {
//!         if let Some(state) = event.get("TransportState") {
//!             println!("{} is {}", event.zp_udn, state);
//!         }
//!     }
//! }
//! # Ok::<(), EventManagerError>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: an M-SEARCH runs at startup and every `search_interval`
//! 2. **Auto-subscribe**: each newly resolved ZonePlayer with a media
//!    renderer gets all six services subscribed
//! 3. **Renewal**: subscriptions renew themselves before they expire
//! 4. **Delivery**: discoveries, confirmations and notifications share one
//!    ordered queue read through [`SonosEventManager::iter`]
//! 5. **Shutdown**: every held subscription is cancelled before the worker
//!    exits

pub mod config;
pub mod error;
pub mod event;
pub mod iter;
pub mod manager;
mod worker;

pub use config::ManagerConfig;
pub use error::{EventManagerError, Result};
pub use event::ManagerEvent;
pub use iter::EventManagerIterator;
pub use manager::SonosEventManager;

// Re-export commonly used types from dependencies
pub use sonos_discovery::{DeviceDescriptor, DiscoveryConfig};
pub use sonos_stream::{NotificationEvent, ServiceTag, StreamConfig, SubscriptionConfirmation};

/// Prelude module for convenient imports
///
/// ```rust
/// use sonos_event_manager::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        DeviceDescriptor, DiscoveryConfig, EventManagerError, EventManagerIterator, ManagerConfig,
        ManagerEvent, NotificationEvent, Result, ServiceTag, SonosEventManager, StreamConfig,
    };
}
