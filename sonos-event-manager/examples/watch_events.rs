//! Watch Events - prints every discovery, subscription and notification
//!
//! Run with: cargo run -p sonos-upnp-event-manager --example watch_events
//! Stop with Ctrl+C; held subscriptions are cancelled on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sonos_event_manager::prelude::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sonos_event_manager=info".parse()?)
                .add_directive("sonos_stream=info".parse()?),
        )
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    let manager = SonosEventManager::with_config(
        ManagerConfig::default().with_search_interval(Duration::from_secs(30)),
    )?;
    println!("Searching for ZonePlayers... (Ctrl+C to stop)\n");

    let events = manager.iter();
    while running.load(Ordering::SeqCst) {
        let Some(event) = events.recv_timeout(Duration::from_millis(250)) else {
            continue;
        };

        match event {
            ManagerEvent::DeviceDiscovered(device) => {
                println!("found    {} ({}) at {}", device.display_name(), device.udn, device.host_url);
            }
            ManagerEvent::Subscribed(confirmation) => {
                println!(
                    "subscribe {:<16} {} -> {}",
                    confirmation.service_tag.as_str(),
                    confirmation.zp_udn,
                    confirmation.subscription_id
                );
            }
            ManagerEvent::Notification(event) => {
                println!(
                    "event    {:<16} {} seq={:?} ({} variables)",
                    event.service_tag.as_str(),
                    event.zp_udn,
                    event.seq,
                    event.data.len()
                );
                for (name, value) in &event.data {
                    println!("           {name} = {value}");
                }
            }
        }
    }

    println!("\nShutting down...");
    manager.shutdown()?;
    Ok(())
}
