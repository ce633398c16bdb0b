//! Config Entries Manager
//!
//! Owns the entries, their persistence, and the per-entry callbacks an
//! integration registers during setup (options update listeners and unload
//! callbacks). Running integration handlers is the job of
//! [`HomeAssistant`](crate::HomeAssistant), which owns this manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::entry::{ConfigEntry, ConfigEntryState};
use crate::storage::{Storable, Storage, StorageError, StorageResult};
use crate::HomeAssistant;

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    /// All config entries
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Listener fired after an entry's options changed
pub type UpdateListener =
    Arc<dyn Fn(Arc<HomeAssistant>, ConfigEntry) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback run once when an entry is unloaded
pub type UnloadCallback = Box<dyn FnOnce(&ConfigEntries) + Send + Sync>;

/// Handle returned by [`ConfigEntries::add_update_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Config Entries Manager
pub struct ConfigEntries {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Options update listeners by entry_id
    update_listeners: DashMap<String, Vec<(ListenerId, UpdateListener)>>,

    /// Callbacks to run on unload, by entry_id
    on_unload: DashMap<String, Vec<UnloadCallback>>,

    next_listener_id: AtomicU64,

    /// Serializes setup/unload across entries
    setup_lock: Mutex<()>,
}

impl ConfigEntries {
    /// Create a new config entries manager
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            update_listeners: DashMap::new(),
            on_unload: DashMap::new(),
            next_listener_id: AtomicU64::new(0),
            setup_lock: Mutex::new(()),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<ConfigEntriesData>().await? {
            info!("Loading {} config entries from storage", data.entries.len());
            for entry in data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> = self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));

        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry.entry_id.clone());
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }
        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain, oldest first
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self
            .by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        // ULIDs sort by creation time
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        entries
    }

    /// Add a new config entry and persist it
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        self.index_entry(entry.clone());
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Replace an entry's options and persist them
    ///
    /// Listeners are not fired here; see
    /// [`HomeAssistant::update_entry_options`](crate::HomeAssistant::update_entry_options).
    pub async fn update_options(
        &self,
        entry_id: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
            entry.options = options;
            entry.modified_at = Utc::now();
            entry.clone()
        };

        self.save().await?;
        debug!("Updated options of config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry and forget its callbacks
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        self.update_listeners.remove(entry_id);
        self.on_unload.remove(entry_id);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    /// Set entry state
    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
            entry.reason = reason;
            debug!("Entry {} state changed to {:?}", entry_id, state);
        }
    }

    /// Register a listener fired whenever the entry's options change
    pub fn add_update_listener(&self, entry_id: &str, listener: UpdateListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.update_listeners
            .entry(entry_id.to_string())
            .or_default()
            .push((id, listener));
        debug!("Added update listener {:?} for entry {}", id, entry_id);
        id
    }

    /// Remove a previously registered update listener
    pub fn remove_update_listener(&self, entry_id: &str, id: ListenerId) -> bool {
        let Some(mut listeners) = self.update_listeners.get_mut(entry_id) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    /// Snapshot of the update listeners registered for an entry
    pub fn update_listeners(&self, entry_id: &str) -> Vec<UpdateListener> {
        self.update_listeners
            .get(entry_id)
            .map(|l| l.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }

    /// Register a callback to run when the entry is unloaded
    pub fn async_on_unload(&self, entry_id: &str, callback: UnloadCallback) {
        self.on_unload
            .entry(entry_id.to_string())
            .or_default()
            .push(callback);
    }

    /// Run and drop the unload callbacks of an entry
    pub fn run_unload_callbacks(&self, entry_id: &str) {
        if let Some((_, callbacks)) = self.on_unload.remove(entry_id) {
            debug!("Running {} unload callbacks for {}", callbacks.len(), entry_id);
            for callback in callbacks {
                callback(self);
            }
        }
    }

    /// Lock held by the host while an entry is being set up or unloaded
    pub fn setup_lock(&self) -> &Mutex<()> {
        &self.setup_lock
    }

    /// Get count of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_manager() -> (TempDir, ConfigEntries) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, ConfigEntries::new(storage))
    }

    fn noop_listener() -> UpdateListener {
        Arc::new(|_hass: Arc<HomeAssistant>, _entry: ConfigEntry| {
            Box::pin(async {}) as BoxFuture<'static, ()>
        })
    }

    #[tokio::test]
    async fn test_add_and_get_by_domain() {
        let (_dir, manager) = create_test_manager();

        let first = manager.add(ConfigEntry::new("a", "First")).await.unwrap();
        let second = manager.add(ConfigEntry::new("a", "Second")).await.unwrap();
        manager.add(ConfigEntry::new("b", "Other")).await.unwrap();

        let entries = manager.get_by_domain("a");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_id, first.entry_id);
        assert_eq!(entries[1].entry_id, second.entry_id);
        assert!(manager.get_by_domain("missing").is_empty());
    }

    #[tokio::test]
    async fn test_update_options() {
        let (_dir, manager) = create_test_manager();
        let entry = manager.add(ConfigEntry::new("a", "Test")).await.unwrap();

        let mut options = HashMap::new();
        options.insert("components_to_disable".to_string(), json!(["stream"]));
        let updated = manager
            .update_options(&entry.entry_id, options)
            .await
            .unwrap();

        assert_eq!(updated.options["components_to_disable"], json!(["stream"]));
        assert!(updated.modified_at >= entry.modified_at);

        let missing = manager.update_options("nope", HashMap::new()).await;
        assert!(matches!(missing, Err(ConfigEntriesError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listener_removed_by_unload_callback() {
        let (_dir, manager) = create_test_manager();
        let entry = manager.add(ConfigEntry::new("a", "Test")).await.unwrap();
        let entry_id = entry.entry_id.clone();

        let id = manager.add_update_listener(&entry_id, noop_listener());
        assert_eq!(manager.update_listeners(&entry_id).len(), 1);

        let target = entry_id.clone();
        manager.async_on_unload(
            &entry_id,
            Box::new(move |entries| {
                entries.remove_update_listener(&target, id);
            }),
        );

        manager.run_unload_callbacks(&entry_id);
        assert!(manager.update_listeners(&entry_id).is_empty());

        // Callbacks run once
        manager.run_unload_callbacks(&entry_id);
        assert!(!manager.remove_update_listener(&entry_id, id));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let mut options = HashMap::new();
        options.insert("components_to_disable".to_string(), json!(["backup"]));
        {
            let manager = ConfigEntries::new(storage.clone());
            manager
                .add(ConfigEntry::new("a", "Test").with_options(options))
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(storage);
        manager.load().await.unwrap();

        let entries = manager.get_by_domain("a");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, ConfigEntryState::NotLoaded);
        assert_eq!(
            entries[0].option::<Vec<String>>("components_to_disable"),
            Some(vec!["backup".to_string()])
        );
    }
}
