//! # Pin Registry
//!
//! Stateful pin management that keeps all map pin state in Rust.
//!
//! ## Architecture
//!
//! The registry owns:
//! - Local pins placed on this device, persisted through the [`PinStore`]
//! - Remote pins, replaced wholesale by every feed snapshot
//! - The single selected pin and the active walking journey
//! - A lazily rebuilt spatial index for viewport queries
//! - The status notifier used for user feedback
//!
//! Lifecycle rules:
//! - At most one local pin is `Placed` at a time
//! - Only `Confirmed` pins can be selected for navigation
//! - Removing a local pin deletes it; removing a remote pin flags it
//!   `Removed` (the bin is gone, its history is not)
//! - Unknown ids are treated as already resolved and ignored

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use rstar::RTree;

use crate::{
    Bounds, Clock, Coordinate, Notice, OptionExt, PathBuilder, Pin, PinLocation, PinStatus,
    PinStore, RemotePinRecord, Result, StatusNotifier, StraightLinePath, WalkPath,
    WasteMapConfig, WasteMapError,
};

pub(crate) const MSG_PIN_ADDED: &str = "Pin added";
pub(crate) const MSG_PIN_PENDING: &str = "Confirm or remove the current pin first";
pub(crate) const MSG_PIN_CONFIRMED: &str = "Pin confirmed";
pub(crate) const MSG_PIN_REMOVED: &str = "Pin removed";

// ============================================================================
// Core Types
// ============================================================================

/// Result of a nearest-pin search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NearestPin {
    pub pin: Pin,
    /// Planar distance in degrees
    pub distance_degrees: f64,
    /// Flat-earth approximation; indicative only
    pub distance_km: f64,
}

/// Registry counters for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RegistryStats {
    pub local_pins: u32,
    pub remote_pins: u32,
    pub removed_pins: u32,
    pub has_placed: bool,
    pub has_selection: bool,
    pub journey_active: bool,
}

#[derive(Debug, Clone)]
struct Journey {
    pin_id: String,
    path: WalkPath,
}

// ============================================================================
// Pin Registry
// ============================================================================

/// Business logic for the pin lifecycle and nearest-bin search.
pub struct PinRegistry {
    store: PinStore,
    config: WasteMapConfig,
    clock: Arc<dyn Clock>,
    notifier: StatusNotifier,
    path_builder: Box<dyn PathBuilder>,

    // Core state
    local_pins: Vec<Pin>,
    remote_pins: Vec<Pin>,
    selected: Option<String>,
    journey: Option<Journey>,

    // Spatial index for viewport queries
    spatial_index: RTree<PinLocation>,
    spatial_dirty: bool,
}

impl PinRegistry {
    /// Create a registry and restore the local pins saved in the store.
    pub fn open(store: PinStore, config: WasteMapConfig, clock: Arc<dyn Clock>) -> Self {
        let local_pins = store.load();
        let notifier = StatusNotifier::new(&config.notifier);

        Self {
            store,
            config,
            clock,
            notifier,
            path_builder: Box::new(StraightLinePath),
            local_pins,
            remote_pins: Vec::new(),
            selected: None,
            journey: None,
            spatial_index: RTree::new(),
            spatial_dirty: true,
        }
    }

    /// Replace the straight-line path builder (e.g. with a routing service).
    pub fn with_path_builder(mut self, builder: Box<dyn PathBuilder>) -> Self {
        self.path_builder = builder;
        self
    }

    pub fn store(&self) -> &PinStore {
        &self.store
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Place a new local pin awaiting confirmation.
    ///
    /// Rejected while another local pin is still `Placed`; the pending pin
    /// is left untouched and the user is told to resolve it first.
    pub fn add_pin(&mut self, coordinate: Coordinate) -> Result<String> {
        if !coordinate.is_valid() {
            return Err(WasteMapError::InvalidCoordinate {
                latitude: coordinate.latitude,
                longitude: coordinate.longitude,
            });
        }

        if let Some(pending) = self.placed_pin() {
            let pending_id = pending.id.clone();
            debug!("[PinRegistry] Rejected placement, {} pending", pending_id);
            self.notify(MSG_PIN_PENDING);
            return Err(WasteMapError::PlacementPending { pending_id });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let pin = Pin::placed(id.clone(), coordinate, chrono::Utc::now().timestamp());
        self.local_pins.push(pin);
        self.spatial_dirty = true;
        self.persist();

        info!(
            "[PinRegistry] Placed pin {} at ({:.5}, {:.5})",
            id, coordinate.latitude, coordinate.longitude
        );
        self.notify(MSG_PIN_ADDED);
        Ok(id)
    }

    /// Confirm the pending local pin. Returns false (no-op) if the id is
    /// unknown or the pin is not awaiting confirmation.
    pub fn confirm_pin(&mut self, id: &str) -> bool {
        let Some(pin) = self
            .local_pins
            .iter_mut()
            .find(|p| p.id == id && p.status == PinStatus::Placed)
        else {
            debug!("[PinRegistry] confirm_pin: nothing to confirm for {}", id);
            return false;
        };

        pin.status = PinStatus::Confirmed;
        self.persist();
        info!("[PinRegistry] Confirmed pin {}", id);
        self.notify(MSG_PIN_CONFIRMED);
        true
    }

    /// Remove a pin from the active set.
    ///
    /// Local pins are deleted; remote pins are flagged `Removed` and the
    /// soft delete is forwarded to the feed. Returns false if the id is
    /// unknown or already removed.
    pub fn remove_pin(&mut self, id: &str) -> bool {
        if let Some(index) = self.local_pins.iter().position(|p| p.id == id) {
            self.local_pins.remove(index);
            self.persist();
        } else if let Some(pin) = self
            .remote_pins
            .iter_mut()
            .find(|p| p.id == id && p.is_active())
        {
            pin.status = PinStatus::Removed;
            self.store.mark_removed(id);
        } else {
            debug!("[PinRegistry] remove_pin: {} not found", id);
            return false;
        }

        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        if self.journey.as_ref().is_some_and(|j| j.pin_id == id) {
            self.journey = None;
        }
        self.spatial_dirty = true;

        info!("[PinRegistry] Removed pin {}", id);
        self.notify(MSG_PIN_REMOVED);
        true
    }

    /// Highlight a confirmed pin, replacing any previous selection.
    ///
    /// The pin currently walked to (`Walking`) can be re-selected, which
    /// keeps its journey. Returns false for unknown ids and for other
    /// statuses; the previous selection is kept in both cases.
    pub fn select_pin(&mut self, id: &str) -> bool {
        let Some(pin) = self.get_pin(id) else {
            debug!("[PinRegistry] select_pin: {} not found", id);
            return false;
        };

        if !matches!(pin.status, PinStatus::Confirmed | PinStatus::Walking) {
            debug!(
                "[PinRegistry] select_pin: {} is {}, not selectable",
                id,
                pin.status.as_str()
            );
            return false;
        }

        if self.selected.as_deref() != Some(id) {
            self.cancel_journey();
        }
        self.selected = Some(id.to_string());
        true
    }

    /// Clear the current selection (and any journey towards it).
    pub fn clear_selection(&mut self) {
        self.cancel_journey();
        self.selected = None;
    }

    // ========================================================================
    // Nearest Search
    // ========================================================================

    /// Find the pin closest to the user in planar degree distance.
    ///
    /// Linear scan over all non-removed pins (remote first, then local);
    /// on equal distance the first pin encountered wins. With
    /// `exclude_coincident`, a pin at the user's exact position is only
    /// returned when no other pin is available.
    pub fn find_nearest(&self, user_location: Coordinate) -> Option<NearestPin> {
        if !user_location.is_valid() {
            return None;
        }

        let mut best: Option<(&Pin, f64)> = None;
        let mut coincident: Option<&Pin> = None;

        for pin in self.pins().filter(|p| p.is_active()) {
            let distance = user_location.degree_distance(&pin.coordinate);
            if self.config.exclude_coincident && distance == 0.0 {
                coincident = coincident.or(Some(pin));
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((pin, distance)),
            }
        }

        best.or(coincident.map(|pin| (pin, 0.0))).map(|(pin, distance)| NearestPin {
            pin: pin.clone(),
            distance_degrees: distance,
            distance_km: distance * self.config.km_per_degree,
        })
    }

    // ========================================================================
    // Journeys
    // ========================================================================

    /// Start walking from `origin` to the selected pin.
    pub fn start_journey(&mut self, origin: Coordinate) -> Result<WalkPath> {
        if !origin.is_valid() {
            return Err(WasteMapError::InvalidCoordinate {
                latitude: origin.latitude,
                longitude: origin.longitude,
            });
        }

        let target_id = self.selected.clone().ok_or_no_selection()?;
        let destination = match self.get_pin(&target_id) {
            Some(pin) if matches!(pin.status, PinStatus::Confirmed | PinStatus::Walking) => {
                pin.coordinate
            }
            Some(pin) => {
                return Err(WasteMapError::NotSelectable {
                    pin_id: target_id,
                    status: pin.status.as_str().to_string(),
                })
            }
            None => return Err(WasteMapError::NoSelection),
        };

        let path = self.path_builder.build(origin, destination);
        self.set_status(&target_id, PinStatus::Walking);
        self.journey = Some(Journey {
            pin_id: target_id.clone(),
            path: path.clone(),
        });
        self.persist();

        info!(
            "[PinRegistry] Journey to {} started ({:.2} km)",
            target_id,
            path.length_km()
        );
        Ok(path)
    }

    /// Abandon the active journey. Returns false if none was active.
    pub fn cancel_journey(&mut self) -> bool {
        let Some(journey) = self.journey.take() else {
            return false;
        };
        if self
            .get_pin(&journey.pin_id)
            .is_some_and(|p| p.status == PinStatus::Walking)
        {
            self.set_status(&journey.pin_id, PinStatus::Confirmed);
            self.persist();
        }
        debug!("[PinRegistry] Journey to {} cancelled", journey.pin_id);
        true
    }

    pub fn active_path(&self) -> Option<&WalkPath> {
        self.journey.as_ref().map(|j| &j.path)
    }

    // ========================================================================
    // Remote Sync
    // ========================================================================

    /// Replace all remote pins with a feed snapshot.
    ///
    /// The snapshot is authoritative: pins absent from it are dropped, never
    /// merged with earlier state.
    pub fn apply_remote_snapshot(&mut self, records: Vec<RemotePinRecord>) {
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
        let mut pins = Vec::with_capacity(records.len());

        for record in &records {
            if !record.coordinate().is_valid() {
                warn!("[PinRegistry] Skipping remote bin {} with invalid coordinate", record.id);
                continue;
            }
            if !seen.insert(record.id.clone()) {
                warn!("[PinRegistry] Duplicate remote bin {} in snapshot", record.id);
                continue;
            }
            pins.push(record.to_pin());
        }
        self.remote_pins = pins;

        // Carry the journey across the snapshot, or end it if its bin is gone
        if let Some(journey) = &self.journey {
            let target = journey.pin_id.clone();
            let is_remote_target = !self.local_pins.iter().any(|p| p.id == target);
            if is_remote_target {
                match self.remote_pins.iter_mut().find(|p| p.id == target) {
                    Some(pin) if pin.status == PinStatus::Confirmed => {
                        pin.status = PinStatus::Walking;
                    }
                    _ => {
                        debug!("[PinRegistry] Journey target {} left the feed", target);
                        self.journey = None;
                    }
                }
            }
        }

        if let Some(selected) = self.selected.clone() {
            let still_selectable = self
                .get_pin(&selected)
                .is_some_and(|p| matches!(p.status, PinStatus::Confirmed | PinStatus::Walking));
            if !still_selectable {
                self.selected = None;
            }
        }

        self.spatial_dirty = true;
        debug!(
            "[PinRegistry] Applied remote snapshot with {} bins",
            self.remote_pins.len()
        );
    }

    // ========================================================================
    // Spatial Queries
    // ========================================================================

    fn ensure_spatial_index(&mut self) {
        if !self.spatial_dirty {
            return;
        }

        let entries: Vec<PinLocation> = self
            .pins()
            .filter(|p| p.is_active())
            .map(|p| PinLocation {
                pin_id: p.id.clone(),
                coordinate: p.coordinate,
            })
            .collect();

        self.spatial_index = RTree::bulk_load(entries);
        self.spatial_dirty = false;
    }

    /// Ids of active pins inside the visible map region, in iteration order.
    pub fn query_viewport(&mut self, bounds: &Bounds) -> Vec<String> {
        self.ensure_spatial_index();

        let inside: HashSet<&str> = self
            .spatial_index
            .locate_in_envelope(&bounds.envelope())
            .map(|entry| entry.pin_id.as_str())
            .collect();

        self.pins()
            .filter(|p| inside.contains(p.id.as_str()))
            .map(|p| p.id.clone())
            .collect()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// All pins, remote first then local, including soft-removed ones.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.remote_pins.iter().chain(self.local_pins.iter())
    }

    pub fn local_pins(&self) -> &[Pin] {
        &self.local_pins
    }

    pub fn remote_pins(&self) -> &[Pin] {
        &self.remote_pins
    }

    pub fn get_pin(&self, id: &str) -> Option<&Pin> {
        self.pins().find(|p| p.id == id)
    }

    /// The local pin awaiting confirmation, if any.
    pub fn placed_pin(&self) -> Option<&Pin> {
        self.local_pins
            .iter()
            .find(|p| p.status == PinStatus::Placed)
    }

    pub fn selected_pin(&self) -> Option<&Pin> {
        self.selected.as_deref().and_then(|id| self.get_pin(id))
    }

    /// Pins as JSON for the map layer.
    pub fn pins_json(&self) -> String {
        let pins: Vec<&Pin> = self.pins().filter(|p| p.is_active()).collect();
        serde_json::to_string(&pins).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            local_pins: self.local_pins.len() as u32,
            remote_pins: self.remote_pins.iter().filter(|p| p.is_active()).count() as u32,
            removed_pins: self.remote_pins.iter().filter(|p| !p.is_active()).count() as u32,
            has_placed: self.placed_pin().is_some(),
            has_selection: self.selected.is_some(),
            journey_active: self.journey.is_some(),
        }
    }

    /// Forget all local pins and wipe the device cache.
    pub fn clear_local(&mut self) {
        let local_ids: HashSet<String> = self.local_pins.iter().map(|p| p.id.clone()).collect();
        if self.selected.as_ref().is_some_and(|id| local_ids.contains(id)) {
            self.selected = None;
        }
        if self.journey.as_ref().is_some_and(|j| local_ids.contains(&j.pin_id)) {
            self.journey = None;
        }
        self.local_pins.clear();
        self.spatial_dirty = true;
        self.store.clear();
    }

    // ========================================================================
    // Status Notices
    // ========================================================================

    /// Show a transient status message.
    pub fn notify(&mut self, message: &str) -> u64 {
        let now = self.clock.now();
        self.notifier.notify(message, now)
    }

    /// The notice the banner should render right now.
    pub fn notice(&self) -> Option<Notice> {
        self.notifier.current(self.clock.now())
    }

    /// Dismiss a notice from a host timer; ignored if superseded.
    pub fn expire_notice(&mut self, generation: u64) -> bool {
        self.notifier.expire(generation)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn set_status(&mut self, id: &str, status: PinStatus) {
        if let Some(pin) = self
            .local_pins
            .iter_mut()
            .chain(self.remote_pins.iter_mut())
            .find(|p| p.id == id)
        {
            pin.status = status;
        }
    }

    fn persist(&self) {
        self.store.save(&self.local_pins);
    }
}

// ============================================================================
// Tests
// ============================================================================
