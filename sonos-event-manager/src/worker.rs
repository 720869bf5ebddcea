//! Background worker thread for discovery and event processing
//!
//! Spawns a thread with its own tokio runtime that owns the [`Prober`] and
//! the [`SubscriptionManager`], while the parent [`SonosEventManager`]
//! exposes a sync API.
//!
//! [`SonosEventManager`]: crate::SonosEventManager

use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use dashmap::DashMap;
use sonos_discovery::{DeviceDescriptor, Prober};
use sonos_stream::SubscriptionManager;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{EventManagerError, Result};
use crate::event::ManagerEvent;

/// Commands sent from the sync SonosEventManager to the background worker
#[derive(Debug)]
pub(crate) enum Command {
    /// Run an SSDP search now
    Search,
    /// Subscribe every supported service of a discovered ZonePlayer
    Subscribe { udn: String },
    /// Cancel every subscription held for a ZonePlayer
    Unsubscribe { udn: String },
    /// Unsubscribe everything and stop the worker
    Shutdown,
}

/// Channels and shared state handed to the worker thread
pub(crate) struct WorkerChannels {
    pub command_rx: UnboundedReceiver<Command>,
    pub event_tx: Sender<ManagerEvent>,
    pub devices: Arc<DashMap<String, Arc<DeviceDescriptor>>>,
    /// Receives `Ok` once the prober and subscription manager exist
    pub ready_tx: mpsc::Sender<Result<()>>,
}

/// Spawns the background event worker thread
pub(crate) fn spawn_event_worker(
    config: ManagerConfig,
    channels: WorkerChannels,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("sonos-event-worker".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for event worker: {}", e);
                    let _ = channels
                        .ready_tx
                        .send(Err(EventManagerError::Runtime(e.to_string())));
                    return;
                }
            };

            rt.block_on(run_event_loop(config, channels));
        })
}

/// Main event loop running inside the tokio runtime
async fn run_event_loop(config: ManagerConfig, channels: WorkerChannels) {
    let WorkerChannels {
        mut command_rx,
        event_tx,
        devices,
        ready_tx,
    } = channels;

    let prober = match Prober::new(config.discovery.clone()) {
        Ok(prober) => prober,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };
    let subscriptions = match SubscriptionManager::new(config.stream.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    let mut discovered = prober.discovery_stream();
    let mut notifications = subscriptions.events();
    let mut search_timer = tokio::time::interval(config.search_interval);

    let _ = ready_tx.send(Ok(()));
    info!("Event worker started");

    loop {
        tokio::select! {
            // First tick completes immediately
            _ = search_timer.tick() => spawn_search(&prober),

            Some(device) = discovered.recv() => {
                devices.insert(device.udn.clone(), Arc::clone(&device));
                if event_tx.send(ManagerEvent::DeviceDiscovered(Arc::clone(&device))).is_err() {
                    debug!("Event receiver dropped, shutting down worker");
                    break;
                }

                if should_auto_subscribe(&config, &device) {
                    spawn_subscribe(&subscriptions, device, event_tx.clone());
                }
            }

            Some(event) = notifications.recv() => {
                if event_tx.send(ManagerEvent::Notification(event)).is_err() {
                    debug!("Event receiver dropped, shutting down worker");
                    break;
                }
            }

            command = command_rx.recv() => match command {
                Some(Command::Search) => spawn_search(&prober),
                Some(Command::Subscribe { udn }) => match prober.device(&udn) {
                    Some(device) => spawn_subscribe(&subscriptions, device, event_tx.clone()),
                    None => warn!(%udn, "subscribe requested for unknown ZonePlayer"),
                },
                Some(Command::Unsubscribe { udn }) => {
                    let subscriptions = subscriptions.clone();
                    tokio::spawn(async move {
                        let removed = subscriptions.unsubscribe(&udn).await;
                        debug!(%udn, removed, "ZonePlayer unsubscribed");
                    });
                }
                Some(Command::Shutdown) | None => {
                    info!("Worker received shutdown command");
                    break;
                }
            },
        }
    }

    subscriptions.shutdown().await;
    info!("Event worker stopped");
}

fn should_auto_subscribe(config: &ManagerConfig, device: &DeviceDescriptor) -> bool {
    config.auto_subscribe && (!config.media_renderers_only || device.device("mediaRenderer").is_some())
}

fn spawn_search(prober: &Prober) {
    let prober = prober.clone();
    tokio::spawn(async move {
        match prober.search().await {
            Ok(new_devices) => debug!(new_devices, "search finished"),
            Err(e) => warn!(error = %e, "SSDP search failed"),
        }
    });
}

fn spawn_subscribe(
    subscriptions: &SubscriptionManager,
    device: Arc<DeviceDescriptor>,
    event_tx: Sender<ManagerEvent>,
) {
    let subscriptions = subscriptions.clone();
    tokio::spawn(async move {
        let mut confirmations = match subscriptions.subscribe(&device).await {
            Ok(confirmations) => confirmations,
            Err(e) => {
                warn!(udn = %device.udn, error = %e, "failed to subscribe ZonePlayer");
                return;
            }
        };

        while let Some(confirmation) = confirmations.recv().await {
            if event_tx.send(ManagerEvent::Subscribed(confirmation)).is_err() {
                break;
            }
        }
    });
}
