//! Discover ZonePlayers, subscribe to all of them and print every event.
//!
//! Run with `RUST_LOG=sonos_stream=debug` to see GENA traffic.

use futures::StreamExt;
use sonos_stream::{StreamConfig, SubscriptionManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let manager = SubscriptionManager::new(StreamConfig::default())?;
    let mut events = manager.events();

    let devices = sonos_discovery::discover().await?;
    if devices.is_empty() {
        println!("No ZonePlayers found");
        return Ok(());
    }

    for device in &devices {
        let confirmations: Vec<_> = manager.subscribe(device).await?.collect().await;
        println!(
            "{} ({}): {} subscriptions",
            device.display_name(),
            device.host_url,
            confirmations.len()
        );
    }

    println!("Listening at {}", manager.callback_url().unwrap_or("?"));
    println!("Press Ctrl+C to stop\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let mut variables: Vec<_> = event.data.keys().map(String::as_str).collect();
                variables.sort_unstable();
                println!("{} {:<16} seq={:?} {}", event.zp_udn, event.service_tag.as_str(), event.seq, variables.join(", "));
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
