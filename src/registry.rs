use crate::config::ConfigEntry;
use crate::coordinator::ZoneCoordinator;
use crate::error::{AmpError, Result};
use crate::store::EntryStore;
use crate::subscription::{StateReceiver, ZoneUpdate, UPDATE_CHANNEL_CAPACITY};
use crate::transport::Transport;
use crate::zone::Zone;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

struct ZoneHandle {
    zone: Zone,
    coordinator: Option<ZoneCoordinator>,
}

/// Live zones for the configured entries
///
/// Setting up an entry builds its [`Zone`] from the effective configuration
/// and, when external polling is enabled, starts a [`ZoneCoordinator`] for
/// it. Every zone shares one update channel.
///
/// # Example
///
/// ```no_run
/// use control4_amp::{ConfigEntry, Registry, UdpTransport, ZoneConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = Registry::new(Arc::new(UdpTransport::new()));
///     let entry = ConfigEntry::new(ZoneConfig::new("Kitchen", "192.168.1.50", 8750, 1));
///
///     let zone = registry.setup_entry(&entry).await?;
///     zone.turn_on().await;
///
///     registry.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Registry {
    transport: Arc<dyn Transport>,
    zones: Arc<Mutex<BTreeMap<Uuid, ZoneHandle>>>,
    update_tx: broadcast::Sender<ZoneUpdate>,
}

impl Registry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            transport,
            zones: Arc::new(Mutex::new(BTreeMap::new())),
            update_tx,
        }
    }

    /// Subscribe to state changes and refresh failures of all zones
    pub fn subscribe_updates(&self) -> StateReceiver {
        StateReceiver::new(self.update_tx.subscribe())
    }

    /// Bring an entry's zone up, replacing any zone already set up for it
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Zone> {
        self.unload_entry(entry.entry_id).await;

        let config = entry.effective();
        let poll = config.poll_external.then_some(config.poll_interval);
        let zone = Zone::new(entry.entry_id, config, self.transport.clone(), self.update_tx.clone());

        let coordinator = match poll {
            Some(interval) => {
                let mut coordinator = ZoneCoordinator::new(zone.clone(), interval);
                coordinator.start().await;
                Some(coordinator)
            }
            None => None,
        };

        tracing::info!("Set up zone {} ({})", zone.name(), zone.key());
        self.zones.lock().unwrap().insert(
            entry.entry_id,
            ZoneHandle {
                zone: zone.clone(),
                coordinator,
            },
        );
        Ok(zone)
    }

    /// Set up every entry in a store
    pub async fn setup_all(&self, store: &dyn EntryStore) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        for entry in store.entries() {
            zones.push(self.setup_entry(&entry).await?);
        }
        Ok(zones)
    }

    /// Tear an entry's zone down.
    ///
    /// Polling has stopped by the time this returns. Returns false if the
    /// entry had no zone.
    pub async fn unload_entry(&self, entry_id: Uuid) -> bool {
        let handle = self.zones.lock().unwrap().remove(&entry_id);
        let Some(handle) = handle else {
            return false;
        };

        if let Some(mut coordinator) = handle.coordinator {
            coordinator.stop().await;
        }
        tracing::info!("Unloaded zone {}", handle.zone.name());
        true
    }

    /// Rebuild an entry's zone from the store after its options changed
    pub async fn reload_entry(&self, store: &dyn EntryStore, entry_id: Uuid) -> Result<Zone> {
        let entry = store.entry(entry_id).ok_or(AmpError::EntryNotFound(entry_id))?;
        self.setup_entry(&entry).await
    }

    pub fn zone(&self, entry_id: Uuid) -> Option<Zone> {
        self.zones.lock().unwrap().get(&entry_id).map(|h| h.zone.clone())
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.zones.lock().unwrap().values().map(|h| h.zone.clone()).collect()
    }

    /// Whether an entry's zone is being polled
    pub fn is_polling(&self, entry_id: Uuid) -> bool {
        self.zones
            .lock()
            .unwrap()
            .get(&entry_id)
            .and_then(|h| h.coordinator.as_ref())
            .is_some_and(|c| c.is_running())
    }

    /// Unload every zone
    pub async fn shutdown(&self) {
        let handles: Vec<ZoneHandle> = {
            let mut zones = self.zones.lock().unwrap();
            std::mem::take(&mut *zones).into_values().collect()
        };

        let stops = handles
            .into_iter()
            .filter_map(|h| h.coordinator)
            .map(|mut coordinator| async move { coordinator.stop().await });
        futures_util::future::join_all(stops).await;
        tracing::info!("All zones unloaded");
    }
}
