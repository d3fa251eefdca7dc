//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The map screen lives in a global [`MapSession`] so the host never has to
//! pass state across the boundary. The host owns the GPS and the hosted
//! document database client: it pushes positions and full remote snapshots
//! in, and is told about soft-removals through [`PinFeedListener`].

use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use once_cell::sync::Lazy;

use crate::{
    build_path, classify_labels, init_logging, Bounds, ClassifyMode, Coordinate,
    KeyValueStorage, LocationAdapter, LocationProvider, MapSession, MemoryPinFeed,
    MemoryStorage, NearestPin, Notice, PinRegistry, PinStore, RegistryStats,
    RemotePinFeed, RemotePinRecord, Result, SnapshotCallback, SqliteStorage, Subscription,
    SystemClock, WalkPath, WasteCategory, WasteMapConfig, WasteMapError,
};

// ============================================================================
// Host Callbacks
// ============================================================================

/// Implement in Kotlin/Swift to write soft-removals back to the shared
/// collection.
#[uniffi::export(callback_interface)]
pub trait PinFeedListener: Send + Sync {
    /// A remote bin was removed on this device.
    fn on_pin_removed(&self, pin_id: String);
}

/// Remote feed fed by host snapshots.
///
/// Soft-removals are queued and handed to the host listener only after the
/// global map lock is released, so the listener may call back into `map_*`.
struct HostPinFeed {
    feed: MemoryPinFeed,
    removals: Arc<Mutex<Vec<String>>>,
}

impl RemotePinFeed for HostPinFeed {
    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription> {
        self.feed.subscribe(callback)
    }

    fn mark_removed(&self, id: &str) -> Result<()> {
        self.feed.mark_removed(id)?;
        self.removals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.to_string());
        Ok(())
    }
}

/// Position slot written by the host's location callbacks.
#[derive(Clone)]
struct HostLocation {
    position: Arc<Mutex<Result<Coordinate>>>,
}

impl HostLocation {
    fn new() -> Self {
        Self {
            position: Arc::new(Mutex::new(Err(WasteMapError::PositionUnavailable {
                message: "no fix yet".to_string(),
            }))),
        }
    }

    fn set(&self, value: Result<Coordinate>) {
        *self.position.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl LocationProvider for HostLocation {
    fn current_position(&self) -> Result<Coordinate> {
        self.position
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ============================================================================
// Global Map State
// ============================================================================

struct MapState {
    session: MapSession,
    feed: MemoryPinFeed,
    location: HostLocation,
    removals: Arc<Mutex<Vec<String>>>,
    listener: Arc<dyn PinFeedListener>,
}

impl MapState {
    fn take_removals(&self) -> Vec<String> {
        std::mem::take(&mut *self.removals.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

static MAP: Lazy<Mutex<Option<MapState>>> = Lazy::new(|| Mutex::new(None));

fn lock_map() -> MutexGuard<'static, Option<MapState>> {
    MAP.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `f` against the open map. Returns None if the map is not open.
fn with_map<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut MapState) -> R,
{
    let mut map = lock_map();
    match map.as_mut() {
        Some(state) => Some(f(state)),
        None => {
            warn!("[WasteMapRust] Map not open");
            None
        }
    }
}

fn open_storage(db_path: &str) -> Box<dyn KeyValueStorage> {
    if db_path.is_empty() {
        return Box::new(MemoryStorage::new());
    }
    match SqliteStorage::new(db_path) {
        Ok(storage) => Box::new(storage),
        Err(e) => {
            warn!(
                "[WasteMapRust] Falling back to in-memory storage, {}: {}",
                db_path, e
            );
            Box::new(MemoryStorage::new())
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Open the map screen. Replaces (and tears down) any open map.
///
/// `config_json` may be empty for defaults. `db_path` may be empty for a
/// non-persistent session.
#[uniffi::export]
pub fn map_open(
    db_path: String,
    config_json: String,
    listener: Box<dyn PinFeedListener>,
) -> bool {
    init_logging();

    let config = if config_json.trim().is_empty() {
        WasteMapConfig::default()
    } else {
        match WasteMapConfig::from_json(&config_json) {
            Ok(config) => config,
            Err(e) => {
                warn!("[WasteMapRust] Rejecting config: {}", e);
                return false;
            }
        }
    };

    let feed = MemoryPinFeed::new();
    let removals = Arc::new(Mutex::new(Vec::new()));
    let host_feed = HostPinFeed {
        feed: feed.clone(),
        removals: Arc::clone(&removals),
    };
    let store = PinStore::new(
        open_storage(&db_path),
        Arc::new(host_feed),
        &config.storage_key,
    );
    let registry = PinRegistry::open(store, config, Arc::new(SystemClock));

    let location = HostLocation::new();
    let session = MapSession::open(
        registry,
        LocationAdapter::new(Box::new(location.clone())),
    );

    // Previous session (if any) is dropped here, cancelling its feed
    *lock_map() = Some(MapState {
        session,
        feed,
        location,
        removals,
        listener: Arc::from(listener),
    });
    info!("[WasteMapRust] Map opened");
    true
}

/// Tear down the map screen.
#[uniffi::export]
pub fn map_close() {
    if let Some(mut state) = lock_map().take() {
        state.session.teardown();
        info!("[WasteMapRust] Map closed");
    }
}

// ============================================================================
// Host Inputs
// ============================================================================

/// Full snapshot of the shared collection as a JSON array of records.
#[uniffi::export]
pub fn map_push_remote_json(records_json: String) -> bool {
    let records: Vec<RemotePinRecord> = match serde_json::from_str(&records_json) {
        Ok(records) => records,
        Err(e) => {
            warn!("[WasteMapRust] Bad remote snapshot: {}", e);
            return false;
        }
    };
    with_map(|state| {
        state.feed.replace_all(records);
        state.session.pump_remote()
    })
    .unwrap_or(false)
}

/// Latest GPS fix from the platform.
#[uniffi::export]
pub fn map_update_position(latitude: f64, longitude: f64) -> bool {
    let position = Coordinate::new(latitude, longitude);
    with_map(|state| {
        state.location.set(Ok(position));
        state.session.on_position_resolved(position)
    })
    .unwrap_or(false)
}

/// The user refused location access.
#[uniffi::export]
pub fn map_location_denied() {
    with_map(|state| {
        state.location.set(Err(WasteMapError::PermissionDenied {
            resource: "location".to_string(),
        }))
    });
}

// ============================================================================
// Gestures
// ============================================================================

/// Place a pin. Returns its id, or None if a pin is still pending.
#[uniffi::export]
pub fn map_tap(latitude: f64, longitude: f64) -> Option<String> {
    with_map(|state| state.session.on_map_tap(Coordinate::new(latitude, longitude)))
        .and_then(|result| result.ok())
}

#[uniffi::export]
pub fn map_pin_tap(pin_id: String) -> bool {
    with_map(|state| state.session.on_pin_tap(&pin_id)).unwrap_or(false)
}

#[uniffi::export]
pub fn map_confirm_pending() -> bool {
    with_map(|state| state.session.confirm_pending()).unwrap_or(false)
}

#[uniffi::export]
pub fn map_remove_pin(pin_id: String) -> bool {
    let Some((removed, removals, listener)) = with_map(|state| {
        let removed = state.session.remove_pin(&pin_id);
        state.session.pump_remote();
        (removed, state.take_removals(), Arc::clone(&state.listener))
    }) else {
        return false;
    };

    // Map lock is released here
    for id in removals {
        listener.on_pin_removed(id);
    }
    removed
}

// ============================================================================
// Navigation
// ============================================================================

#[uniffi::export]
pub fn map_find_nearest() -> Option<NearestPin> {
    with_map(|state| state.session.find_nearest())
        .and_then(|result| result.ok())
        .flatten()
}

/// Start walking to the selected bin. Returns flat [lat, lng, ...] coords,
/// empty if no journey could start.
#[uniffi::export]
pub fn map_start_journey() -> Vec<f64> {
    with_map(|state| state.session.start_journey())
        .and_then(|result| result.ok())
        .map(|path| path.to_flat())
        .unwrap_or_default()
}

#[uniffi::export]
pub fn map_cancel_journey() -> bool {
    with_map(|state| state.session.cancel_journey()).unwrap_or(false)
}

// ============================================================================
// Queries
// ============================================================================

/// All pins (remote then local) as JSON.
#[uniffi::export]
pub fn map_get_pins_json() -> String {
    with_map(|state| state.session.registry().pins_json()).unwrap_or_else(|| "[]".to_string())
}

#[uniffi::export]
pub fn map_query_viewport(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Vec<String> {
    let bounds = Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    };
    with_map(|state| state.session.registry_mut().query_viewport(&bounds)).unwrap_or_default()
}

#[uniffi::export]
pub fn map_get_stats() -> Option<RegistryStats> {
    with_map(|state| state.session.registry().stats())
}

/// Status line to draw now, with its fade opacity.
#[uniffi::export]
pub fn map_current_notice() -> Option<Notice> {
    with_map(|state| state.session.notice()).flatten()
}

// ============================================================================
// Stateless Helpers
// ============================================================================

#[uniffi::export]
pub fn ffi_classify_labels(labels: Vec<String>, mode: ClassifyMode) -> Option<WasteCategory> {
    init_logging();
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    classify_labels(&labels, mode)
}

#[uniffi::export]
pub fn ffi_build_path(origin: Coordinate, destination: Coordinate) -> WalkPath {
    build_path(origin, destination)
}

/// Send a photo to the vision API and categorize it. Blocks the caller.
#[cfg(feature = "http")]
#[uniffi::export]
pub fn ffi_classify_image(
    api_key: String,
    image: Vec<u8>,
    mode: ClassifyMode,
) -> Option<WasteCategory> {
    init_logging();
    match crate::http::classify_image_sync(&api_key, &image, mode, Default::default()) {
        Ok(category) => category,
        Err(e) => {
            warn!("[WasteMapRust] Image classification failed: {}", e);
            None
        }
    }
}
