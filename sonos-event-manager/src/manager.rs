//! Sync-first Sonos Event Manager
//!
//! Provides a fully synchronous API over discovery and GENA subscriptions.
//! All async operations are hidden in a background worker thread.

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver};
use dashmap::DashMap;
use sonos_discovery::DeviceDescriptor;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::warn;

use crate::config::ManagerConfig;
use crate::error::{EventManagerError, Result};
use crate::event::ManagerEvent;
use crate::iter::EventManagerIterator;
use crate::worker::{spawn_event_worker, Command, WorkerChannels};

/// Sync-first event manager for Sonos ZonePlayers
///
/// Searches the network periodically, subscribes discovered players and
/// funnels every discovery, confirmation and notification into one
/// blocking iterator. All methods are blocking.
///
/// # Example
///
/// ```no_run
/// use sonos_event_manager::{ManagerEvent, SonosEventManager};
///
/// let manager = SonosEventManager::new()?;
///
/// for event in manager.iter() {
///     match event {
///         ManagerEvent::DeviceDiscovered(device) => println!("found {}", device.display_name()),
///         ManagerEvent::Subscribed(confirmation) => println!("subscribed {}", confirmation.service_tag),
///         ManagerEvent::Notification(event) => println!("{}: {:?}", event.service_tag, event.data),
///     }
/// }
/// # Ok::<(), sonos_event_manager::EventManagerError>(())
/// ```
pub struct SonosEventManager {
    /// Send commands to background worker
    command_tx: UnboundedSender<Command>,

    /// Receive events from background worker
    event_rx: Receiver<ManagerEvent>,

    /// Discovered ZonePlayers keyed by UDN, filled by the worker
    devices: Arc<DashMap<String, Arc<DeviceDescriptor>>>,

    /// Taken by `shutdown`
    worker: Option<JoinHandle<()>>,
}

impl SonosEventManager {
    /// Create a manager with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a manager with custom configuration
    ///
    /// Blocks until the worker has created its prober and subscription
    /// manager, so construction errors are reported here.
    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded();
        let (ready_tx, ready_rx) = mpsc::channel();
        let devices = Arc::new(DashMap::new());

        let worker = spawn_event_worker(
            config,
            WorkerChannels {
                command_rx,
                event_tx,
                devices: Arc::clone(&devices),
                ready_tx,
            },
        )
        .map_err(|e| EventManagerError::Runtime(format!("Failed to spawn event worker: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(EventManagerError::WorkerDisconnected);
            }
        }

        Ok(Self {
            command_tx,
            event_rx,
            devices,
            worker: Some(worker),
        })
    }

    /// Start an SSDP search now instead of waiting for the next interval
    pub fn search(&self) -> Result<()> {
        self.send(Command::Search)
    }

    /// Subscribe every supported service of a discovered ZonePlayer.
    ///
    /// Services already subscribed are skipped. Confirmations arrive on the
    /// iterator as [`ManagerEvent::Subscribed`].
    pub fn subscribe(&self, udn: &str) -> Result<()> {
        if !self.devices.contains_key(udn) {
            return Err(EventManagerError::DeviceNotFound(udn.to_string()));
        }
        self.send(Command::Subscribe {
            udn: udn.to_string(),
        })
    }

    /// Cancel every subscription held for a ZonePlayer
    pub fn unsubscribe(&self, udn: &str) -> Result<()> {
        if !self.devices.contains_key(udn) {
            return Err(EventManagerError::DeviceNotFound(udn.to_string()));
        }
        self.send(Command::Unsubscribe {
            udn: udn.to_string(),
        })
    }

    /// Every ZonePlayer discovered so far
    pub fn devices(&self) -> Vec<Arc<DeviceDescriptor>> {
        self.devices.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn device(&self, udn: &str) -> Option<Arc<DeviceDescriptor>> {
        self.devices.get(udn).map(|entry| Arc::clone(entry.value()))
    }

    /// Blocking iterator over discovery, subscription and notification events
    pub fn iter(&self) -> EventManagerIterator {
        EventManagerIterator::new(self.event_rx.clone())
    }

    /// Unsubscribe everything and wait for the worker to stop
    pub fn shutdown(mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // A closed channel means the worker already stopped
        let _ = self.command_tx.send(Command::Shutdown);
        worker
            .join()
            .map_err(|_| EventManagerError::Runtime("Event worker panicked".to_string()))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| EventManagerError::WorkerDisconnected)
    }
}

impl Drop for SonosEventManager {
    fn drop(&mut self) {
        if self.worker.is_some() && self.command_tx.send(Command::Shutdown).is_err() {
            warn!("Event worker already stopped");
        }
    }
}
