use crate::config::{ConfigEntry, ZoneOptions};
use crate::error::{AmpError, Result};
use crate::types::{AmpId, Channel};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence of zone entries, provided by the host.
///
/// Reads and writes are not transactional across entries; the last writer
/// wins when two edits touch the same entry.
pub trait EntryStore: Send + Sync {
    /// All entries, in a stable order
    fn entries(&self) -> Vec<ConfigEntry>;

    /// Persist a new entry; fails if its unique id is already taken
    fn add_entry(&self, entry: ConfigEntry) -> Result<()>;

    /// Replace the options overlay of an entry
    fn update_options(&self, entry_id: Uuid, options: ZoneOptions) -> Result<()>;

    fn remove_entry(&self, entry_id: Uuid) -> Option<ConfigEntry>;

    fn entry(&self, entry_id: Uuid) -> Option<ConfigEntry> {
        self.entries().into_iter().find(|e| e.entry_id == entry_id)
    }

    /// Entries on the same amplifier
    fn entries_for_amp(&self, amp: &AmpId) -> Vec<ConfigEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.amp_id() == *amp)
            .collect()
    }

    /// Channels already configured on an amplifier
    fn used_channels(&self, amp: &AmpId) -> BTreeSet<Channel> {
        self.entries_for_amp(amp)
            .iter()
            .map(|e| e.data.channel)
            .collect()
    }
}

/// In-memory entry store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<Uuid, ConfigEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with existing entries
    pub fn with_entries(entries: impl IntoIterator<Item = ConfigEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|e| (e.entry_id, e)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize all entries as JSON for the host to persist
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<ConfigEntry> = self.entries();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<ConfigEntry> = serde_json::from_str(json)?;
        Ok(Self::with_entries(entries))
    }
}

impl EntryStore for MemoryStore {
    fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.entries.lock().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| a.data.key().cmp(&b.data.key()));
        entries
    }

    fn add_entry(&self, entry: ConfigEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.values().any(|e| e.unique_id == entry.unique_id) {
            return Err(AmpError::AlreadyConfigured(entry.unique_id));
        }
        tracing::info!("Created entry {}", entry.title);
        entries.insert(entry.entry_id, entry);
        Ok(())
    }

    fn update_options(&self, entry_id: Uuid, options: ZoneOptions) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(&entry_id)
            .ok_or(AmpError::EntryNotFound(entry_id))?;
        entry.options = options;
        Ok(())
    }

    fn remove_entry(&self, entry_id: Uuid) -> Option<ConfigEntry> {
        self.entries.lock().unwrap().remove(&entry_id)
    }
}
