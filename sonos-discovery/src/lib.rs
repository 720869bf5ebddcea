//! Sonos ZonePlayer discovery.
//!
//! This crate finds ZonePlayers on the local network with SSDP and turns each
//! device description into a normalized [`DeviceDescriptor`] tree.
//!
//! # Quick Start
//!
//! ```no_run
//! use sonos_discovery::discover;
//!
//! # async fn example() -> sonos_discovery::Result<()> {
//! for zone_player in discover().await? {
//!     println!("Found {} at {}", zone_player.display_name(), zone_player.host_url);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming Discovery
//!
//! For long-running processes, keep a [`Prober`] around, listen on its
//! discovery stream and call [`Prober::search`] whenever a new sweep is
//! wanted. Each `USN` is resolved and published at most once.
//!
//! ```no_run
//! use sonos_discovery::{DiscoveryConfig, Prober};
//!
//! # async fn example() -> sonos_discovery::Result<()> {
//! let prober = Prober::new(DiscoveryConfig::default())?;
//! let mut stream = prober.discovery_stream();
//!
//! tokio::spawn({
//!     let prober = prober.clone();
//!     async move { prober.search().await }
//! });
//!
//! while let Some(zone_player) = stream.recv().await {
//!     if let Some(renderer) = zone_player.device("mediaRenderer") {
//!         println!("{} has {} renderer services", zone_player.udn, renderer.services.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod description;
mod error;
mod prober;
pub mod scpd;
mod source;
pub mod ssdp;
pub mod xml;

pub use config::{DiscoveryConfig, SSDP_MULTICAST_ADDR, ZONE_PLAYER_SEARCH_TARGET};
pub use description::{
    format_type_name, host_url_from_location, normalize_device, DeviceDescriptor,
    ServiceDescriptor,
};
pub use error::{DiscoveryError, Result};
pub use prober::{DiscoveryStream, Prober};
pub use scpd::ServiceDescription;
pub use source::{DescriptionSource, HttpDescriptionSource};

use std::sync::Arc;

/// Discover ZonePlayers with the default configuration.
///
/// Runs one search and waits for every reply to be resolved.
pub async fn discover() -> Result<Vec<Arc<DeviceDescriptor>>> {
    discover_with_config(DiscoveryConfig::default()).await
}

/// Discover ZonePlayers with a custom configuration.
pub async fn discover_with_config(config: DiscoveryConfig) -> Result<Vec<Arc<DeviceDescriptor>>> {
    Prober::new(config)?.search_and_wait().await
}
