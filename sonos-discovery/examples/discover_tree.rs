//! Discover ZonePlayers and print their normalized device trees
//!
//! Usage: cargo run -p sonos-upnp-discovery --example discover_tree [window-secs]

use std::time::Duration;

use sonos_discovery::{discover_with_config, DeviceDescriptor, DiscoveryConfig};
use tracing_subscriber::EnvFilter;

fn print_device(device: &DeviceDescriptor, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}{} ({})", device.friendly_name, device.udn);
    for (name, service) in &device.services {
        let actions = service
            .description
            .as_ref()
            .map(|d| d.actions.len())
            .unwrap_or(0);
        println!("{indent}  service {name}: {} [{actions} actions]", service.event_endpoint());
    }
    for (name, children) in &device.devices {
        for child in children {
            println!("{indent}  device {name}:");
            print_device(child, depth + 2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let window = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let config = DiscoveryConfig::default().with_search_window(Duration::from_secs(window));
    let zone_players = discover_with_config(config).await?;

    if zone_players.is_empty() {
        println!("No ZonePlayers found");
    }
    for zone_player in zone_players {
        println!("== {} @ {}", zone_player.display_name(), zone_player.host_url);
        print_device(&zone_player, 1);
    }

    Ok(())
}
