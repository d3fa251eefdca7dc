//! # Pin Store
//!
//! Persistence hooks for the pin collection:
//!
//! 1. **Local pins** are serialized as JSON into device key/value storage.
//!    Writes are best-effort; a missing or corrupt cache loads as empty.
//! 2. **Remote pins** arrive through a live snapshot feed. Each delivery is
//!    the complete current collection, never a diff.
//!
//! The storage and feed are collaborator traits so the registry can be driven
//! without a device or a live backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info, warn};

use crate::{Pin, PinSource, PinStatus, RemotePinRecord, Result, WasteMapError};

// ============================================================================
// Device Storage
// ============================================================================

/// Opaque key/value device storage. Values are JSON strings.
pub trait KeyValueStorage: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-memory storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| WasteMapError::StorageError {
            message: "memory storage lock poisoned".to_string(),
        })
    }
}

impl KeyValueStorage for MemoryStorage {
    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// SQLite-backed device storage.
#[cfg(feature = "persistence")]
pub struct SqliteStorage {
    db: Mutex<rusqlite::Connection>,
}

#[cfg(feature = "persistence")]
impl SqliteStorage {
    /// Open (or create) the storage database at the given path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = rusqlite::Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[PinStore] Opened device storage at {}", db_path);
        Ok(Self { db: Mutex::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
        "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| WasteMapError::StorageError {
            message: "storage connection lock poisoned".to_string(),
        })
    }
}

#[cfg(feature = "persistence")]
impl KeyValueStorage for SqliteStorage {
    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;

        let value: Option<String> = self
            .lock()?
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }
}

// ============================================================================
// Remote Feed
// ============================================================================

/// Receives the full remote collection on every change.
pub type SnapshotCallback = Arc<dyn Fn(Vec<RemotePinRecord>) + Send + Sync>;

/// Live connection to the shared bin collection.
pub trait RemotePinFeed: Send + Sync {
    /// Start receiving snapshots. The callback must be treated as
    /// authoritative: each invocation replaces all prior remote state.
    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription>;

    /// Soft-delete a bin: it stays in history flagged as removed.
    fn mark_removed(&self, id: &str) -> Result<()>;
}

/// Handle to an open feed subscription.
///
/// Dropping the handle cancels the subscription, so the owning view
/// cannot leak the live connection.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Cancel the subscription.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct FeedState {
    records: Vec<RemotePinRecord>,
    subscribers: Vec<(u64, SnapshotCallback)>,
    next_subscriber: u64,
}

/// In-process bin collection that broadcasts full snapshots.
///
/// Stands in for the hosted document database in tests and offline builds.
/// Like the hosted client, a new subscriber immediately receives the
/// current snapshot.
#[derive(Clone, Default)]
pub struct MemoryPinFeed {
    state: Arc<Mutex<FeedState>>,
}

impl MemoryPinFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<RemotePinRecord>) -> Self {
        let feed = Self::new();
        feed.lock().records = records;
        feed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        // State stays consistent across a panicking subscriber
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a record by id, then broadcast.
    pub fn upsert(&self, record: RemotePinRecord) {
        {
            let mut state = self.lock();
            match state.records.iter().position(|r| r.id == record.id) {
                Some(index) => state.records[index] = record,
                None => state.records.push(record),
            }
        }
        self.broadcast();
    }

    /// Replace the whole collection, then broadcast.
    ///
    /// Used by hosts that receive full snapshots from their own client.
    pub fn replace_all(&self, records: Vec<RemotePinRecord>) {
        self.lock().records = records;
        self.broadcast();
    }

    /// Hard-delete a record, then broadcast. Returns false if absent.
    pub fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.records.len();
            state.records.retain(|r| r.id != id);
            state.records.len() != before
        };
        if removed {
            self.broadcast();
        }
        removed
    }

    /// Current collection contents.
    pub fn records(&self) -> Vec<RemotePinRecord> {
        self.lock().records.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn broadcast(&self) {
        // Callbacks run outside the lock so they may call back into the feed
        let (snapshot, callbacks) = {
            let state = self.lock();
            let callbacks: Vec<SnapshotCallback> =
                state.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (state.records.clone(), callbacks)
        };
        debug!(
            "[PinFeed] Broadcasting {} records to {} subscribers",
            snapshot.len(),
            callbacks.len()
        );
        for callback in callbacks {
            callback(snapshot.clone());
        }
    }
}

impl RemotePinFeed for MemoryPinFeed {
    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription> {
        let (id, snapshot) = {
            let mut state = self.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.push((id, Arc::clone(&callback)));
            (id, state.records.clone())
        };

        callback(snapshot);

        let state: Weak<Mutex<FeedState>> = Arc::downgrade(&self.state);
        Ok(Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.subscribers.retain(|(sid, _)| *sid != id);
                debug!("[PinFeed] Subscriber {} cancelled", id);
            }
        }))
    }

    fn mark_removed(&self, id: &str) -> Result<()> {
        {
            let mut state = self.lock();
            let record = state
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| WasteMapError::FeedError {
                    message: format!("no bin '{}' in collection", id),
                })?;
            record.removed = true;
        }
        self.broadcast();
        Ok(())
    }
}

// ============================================================================
// Pin Store
// ============================================================================

/// Local pin cache plus the remote feed handle.
pub struct PinStore {
    storage: Box<dyn KeyValueStorage>,
    feed: Arc<dyn RemotePinFeed>,
    key: String,
}

impl PinStore {
    pub fn new(storage: Box<dyn KeyValueStorage>, feed: Arc<dyn RemotePinFeed>, key: &str) -> Self {
        Self {
            storage,
            feed,
            key: key.to_string(),
        }
    }

    /// Restore previously saved local pins.
    ///
    /// Returns an empty set when nothing is stored or the cache cannot be
    /// read. Journeys do not survive a restart, so `Walking` pins come back
    /// `Confirmed`; only the first `Placed` pin is kept.
    pub fn load(&self) -> Vec<Pin> {
        let raw = match self.storage.load(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("[PinStore] Failed to read local pins: {}", e);
                return Vec::new();
            }
        };

        let stored: Vec<Pin> = match serde_json::from_str(&raw) {
            Ok(pins) => pins,
            Err(e) => {
                warn!("[PinStore] Discarding corrupt pin cache: {}", e);
                return Vec::new();
            }
        };

        let mut has_placed = false;
        let pins: Vec<Pin> = stored
            .into_iter()
            .filter(|p| p.source == PinSource::Local && p.coordinate.is_valid())
            .filter_map(|mut pin| match pin.status {
                PinStatus::Removed => None,
                PinStatus::Walking => {
                    pin.status = PinStatus::Confirmed;
                    Some(pin)
                }
                PinStatus::Placed if has_placed => {
                    warn!("[PinStore] Dropping extra unconfirmed pin {}", pin.id);
                    None
                }
                PinStatus::Placed => {
                    has_placed = true;
                    Some(pin)
                }
                PinStatus::Confirmed => Some(pin),
            })
            .collect();

        info!("[PinStore] Restored {} local pins", pins.len());
        pins
    }

    /// Persist the full local pin set. Best-effort: failures are logged
    /// and reported through the return value only.
    pub fn save(&self, pins: &[Pin]) -> bool {
        let json = match serde_json::to_string(pins) {
            Ok(json) => json,
            Err(e) => {
                warn!("[PinStore] Failed to serialize pins: {}", e);
                return false;
            }
        };
        match self.storage.save(&self.key, &json) {
            Ok(()) => {
                debug!("[PinStore] Saved {} local pins", pins.len());
                true
            }
            Err(e) => {
                warn!("[PinStore] Failed to save pins: {}", e);
                false
            }
        }
    }

    /// Drop the local pin cache.
    pub fn clear(&self) -> bool {
        match self.storage.clear(&self.key) {
            Ok(()) => true,
            Err(e) => {
                warn!("[PinStore] Failed to clear pin cache: {}", e);
                false
            }
        }
    }

    /// Open a live subscription to the remote bin collection.
    ///
    /// The returned handle must be kept for as long as updates are wanted
    /// and cancelled on teardown.
    pub fn subscribe_remote(&self, callback: SnapshotCallback) -> Result<Subscription> {
        let subscription = self.feed.subscribe(callback)?;
        info!("[PinStore] Subscribed to remote bins");
        Ok(subscription)
    }

    /// Forward a soft delete to the remote collection. Best-effort.
    pub fn mark_removed(&self, id: &str) -> bool {
        match self.feed.mark_removed(id) {
            Ok(()) => true,
            Err(e) => {
                warn!("[PinStore] Failed to mark bin {} removed: {}", id, e);
                false
            }
        }
    }
}
