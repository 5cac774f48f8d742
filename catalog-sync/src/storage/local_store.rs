//! Origin-wide storage area and per-tab handles

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::message::TabId;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{MemoryBackend, RedbBackend, StorageBackend, StorageResult};

/// Capacity of the storage event channel
const EVENT_CAPACITY: usize = 256;

/// Mutation notification, fired to every tab except the writer
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// Tab that performed the write
    pub origin: TabId,
}

/// 存储区域 - one per origin, shared by all its tabs
#[derive(Clone)]
pub struct SharedStorage {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    /// Serializes read-compare-write so events carry the right old value
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SharedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStorage")
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl SharedStorage {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Open (or create) a redb-backed storage area
    pub fn open_redb(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(Arc::new(RedbBackend::open(path)?)))
    }

    /// Per-tab handle
    pub fn handle(&self, origin: TabId) -> LocalStore {
        LocalStore {
            origin,
            shared: self.clone(),
        }
    }

    /// Subscribe to mutation notifications
    ///
    /// Receivers see every event; filtering out one's own writes is the
    /// subscriber's job (see `StorageEvent::origin`).
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn get_raw(&self, key: &str) -> StorageResult<Option<String>> {
        self.backend.get(key)
    }

    /// Write a raw value; identical writes are silent (no event)
    pub fn set_raw(&self, origin: TabId, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let old_value = self.backend.get(key)?;
        if old_value.as_deref() == Some(value) {
            return Ok(());
        }
        self.backend.set(key, value)?;
        self.notify(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: Some(value.to_string()),
            origin,
        });
        Ok(())
    }

    /// Remove a key; removing a missing key is silent
    pub fn remove_raw(&self, origin: TabId, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let old_value = self.backend.get(key)?;
        if old_value.is_none() {
            return Ok(());
        }
        self.backend.remove(key)?;
        self.notify(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: None,
            origin,
        });
        Ok(())
    }

    fn notify(&self, event: StorageEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Per-tab typed store
///
/// Every failure (backend error, unparsable value, serialization error) is
/// logged and degrades to the default; nothing here propagates.
#[derive(Debug, Clone)]
pub struct LocalStore {
    origin: TabId,
    shared: SharedStorage,
}

impl LocalStore {
    pub fn origin(&self) -> TabId {
        self.origin
    }

    pub fn shared(&self) -> &SharedStorage {
        &self.shared
    }

    /// Read and parse `key`, or `default` when missing or unreadable
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_read(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage read failed, using default");
                default
            }
        }
    }

    /// Serialize and write `value`; returns false when the store rejected it
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.try_write(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage write failed, keeping in-memory state");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.shared.remove_raw(self.origin, key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage remove failed");
                false
            }
        }
    }

    /// Sets are stored as JSON arrays
    pub fn read_set<T: DeserializeOwned + Ord>(&self, key: &str) -> BTreeSet<T> {
        self.read::<Vec<T>>(key, Vec::new()).into_iter().collect()
    }

    pub fn write_set<T: Serialize + Ord>(&self, key: &str, set: &BTreeSet<T>) -> bool {
        let items: Vec<&T> = set.iter().collect();
        self.write(key, &items)
    }

    fn try_read<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.shared.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn try_write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.shared.set_raw(self.origin, key, &raw)
    }
}
