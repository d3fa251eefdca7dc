//! Map presentation bridge.
//!
//! A [`MapSession`] is the owning view of the map screen. It routes user
//! gestures into the [`PinRegistry`], fetches the device position on demand
//! and keeps the remote bin subscription alive for exactly as long as the
//! view exists.
//!
//! Feed callbacks may fire on any thread. They only enqueue snapshots; the
//! host applies them on its event thread with [`MapSession::pump_remote`].
//! After [`MapSession::teardown`] the subscription is cancelled and late
//! completions (positions, snapshots) no longer touch state.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::{
    Coordinate, LocationAdapter, NearestPin, Notice, PinRegistry, RemotePinRecord, Result,
    SnapshotCallback, Subscription, WalkPath, WasteMapError,
};

const MSG_LOCATION_DENIED: &str = "Location permission is required to find bins";
const MSG_LOCATION_FAILED: &str = "Could not get your location";
const MSG_FEED_FAILED: &str = "Could not load shared bins";
const MSG_NO_BINS: &str = "No bins found nearby";
const MSG_AT_BIN: &str = "You are at a bin";

/// The live map screen.
pub struct MapSession {
    registry: PinRegistry,
    location: LocationAdapter,
    subscription: Option<Subscription>,
    snapshots: mpsc::Receiver<Vec<RemotePinRecord>>,
    closed: bool,
}

impl MapSession {
    /// Open the map: subscribe to remote bins and apply the first snapshot.
    ///
    /// A feed that cannot be opened is reported to the user; the map still
    /// works with local pins.
    pub fn open(registry: PinRegistry, location: LocationAdapter) -> Self {
        let (sender, snapshots) = mpsc::channel();
        let sender = Mutex::new(sender);
        let callback: SnapshotCallback = Arc::new(move |snapshot: Vec<RemotePinRecord>| {
            if let Ok(sender) = sender.lock() {
                // Receiver gone means the session was dropped
                let _ = sender.send(snapshot);
            }
        });

        let mut session = Self {
            registry,
            location,
            subscription: None,
            snapshots,
            closed: false,
        };

        match session.registry.store().subscribe_remote(callback) {
            Ok(subscription) => session.subscription = Some(subscription),
            Err(e) => {
                warn!("[MapSession] Remote bins unavailable: {}", e);
                session.registry.notify(MSG_FEED_FAILED);
            }
        }

        session.pump_remote();
        info!("[MapSession] Opened");
        session
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PinRegistry {
        &mut self.registry
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(WasteMapError::SessionClosed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Remote Feed
    // ========================================================================

    /// Apply queued feed snapshots. Each snapshot is the full collection,
    /// so only the newest one matters. Returns true if state changed.
    pub fn pump_remote(&mut self) -> bool {
        let latest = self.snapshots.try_iter().last();
        if self.closed {
            return false;
        }
        match latest {
            Some(snapshot) => {
                self.registry.apply_remote_snapshot(snapshot);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Gestures
    // ========================================================================

    /// Tap on empty map: place a new pin.
    pub fn on_map_tap(&mut self, coordinate: Coordinate) -> Result<String> {
        self.ensure_open()?;
        self.registry.add_pin(coordinate)
    }

    /// Tap on a pin marker: select it.
    pub fn on_pin_tap(&mut self, id: &str) -> bool {
        !self.closed && self.registry.select_pin(id)
    }

    /// Confirm whichever pin is awaiting confirmation.
    pub fn confirm_pending(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.registry.placed_pin().map(|p| p.id.clone()) {
            Some(id) => self.registry.confirm_pin(&id),
            None => false,
        }
    }

    pub fn remove_pin(&mut self, id: &str) -> bool {
        !self.closed && self.registry.remove_pin(id)
    }

    // ========================================================================
    // Location
    // ========================================================================

    fn locate(&mut self) -> Result<Coordinate> {
        match self.location.refresh() {
            Ok(position) => Ok(position),
            Err(e) => {
                let message = if e.is_blocking() {
                    MSG_LOCATION_DENIED
                } else {
                    MSG_LOCATION_FAILED
                };
                self.registry.notify(message);
                Err(e)
            }
        }
    }

    /// Fetch a fresh position to center the map on.
    pub fn recenter(&mut self) -> Result<Coordinate> {
        self.ensure_open()?;
        self.locate()
    }

    /// Accept a position resolved asynchronously by the platform.
    /// Ignored once the session is torn down.
    pub fn on_position_resolved(&mut self, position: Coordinate) -> bool {
        if self.closed {
            debug!("[MapSession] Dropping position resolved after teardown");
            return false;
        }
        self.location.record(position)
    }

    pub fn last_known_position(&self) -> Option<Coordinate> {
        self.location.last_known()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Locate the user and find the closest bin.
    pub fn find_nearest(&mut self) -> Result<Option<NearestPin>> {
        self.ensure_open()?;
        let position = self.locate()?;

        let nearest = self.registry.find_nearest(position);
        match &nearest {
            Some(found) if found.distance_degrees == 0.0 => {
                self.registry.notify(MSG_AT_BIN);
            }
            Some(found) => {
                let message = format!("Nearest bin is about {:.1} km away", found.distance_km);
                self.registry.notify(&message);
            }
            None => {
                self.registry.notify(MSG_NO_BINS);
            }
        }
        Ok(nearest)
    }

    /// Locate the user and start walking to the selected bin.
    pub fn start_journey(&mut self) -> Result<WalkPath> {
        self.ensure_open()?;
        let origin = self.locate()?;
        self.registry.start_journey(origin)
    }

    pub fn cancel_journey(&mut self) -> bool {
        !self.closed && self.registry.cancel_journey()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.registry.notice()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Cancel the remote subscription and stop accepting updates.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.closed = true;
        info!("[MapSession] Torn down");
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        FixedLocation, ManualClock, MemoryPinFeed, MemoryStorage, PinStatus, PinStore,
        RemotePinFeed, WasteMapConfig,
    };

    fn record(id: &str, lat: f64, lng: f64) -> RemotePinRecord {
        RemotePinRecord {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            image_url: String::new(),
            timestamp: 0,
            latitude: lat,
            longitude: lng,
            landfill: false,
            compost: true,
            recycling: false,
            paper: false,
            confirm: true,
            removed: false,
        }
    }

    fn session(feed: &MemoryPinFeed, location: FixedLocation) -> MapSession {
        let store = PinStore::new(Box::new(MemoryStorage::new()), Arc::new(feed.clone()), "pins");
        let registry =
            PinRegistry::open(store, WasteMapConfig::default(), Arc::new(ManualClock::new()));
        MapSession::open(registry, LocationAdapter::new(Box::new(location)))
    }

    #[test]
    fn test_open_applies_initial_snapshot() {
        let feed = MemoryPinFeed::with_records(vec![record("r1", 1.0, 1.0)]);
        let session = session(&feed, FixedLocation::at(0.0, 0.0));

        assert!(session.is_subscribed());
        assert_eq!(session.registry().remote_pins().len(), 1);
    }

    #[test]
    fn test_pump_applies_latest_snapshot() {
        let feed = MemoryPinFeed::new();
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        feed.upsert(record("r1", 1.0, 1.0));
        feed.upsert(record("r2", 2.0, 2.0));
        assert!(session.registry().remote_pins().is_empty());

        assert!(session.pump_remote());
        assert_eq!(session.registry().remote_pins().len(), 2);
        assert!(!session.pump_remote());
    }

    #[test]
    fn test_removing_remote_pin_round_trips_through_feed() {
        let feed = MemoryPinFeed::with_records(vec![record("r1", 1.0, 1.0)]);
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        assert!(session.remove_pin("r1"));
        session.pump_remote();
        assert_eq!(
            session.registry().get_pin("r1").unwrap().status,
            PinStatus::Removed
        );
    }

    #[test]
    fn test_find_nearest_uses_location() {
        let feed = MemoryPinFeed::with_records(vec![record("far", 1.0, 1.0), record("near", 0.1, 0.1)]);
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        let nearest = session.find_nearest().unwrap().unwrap();
        assert_eq!(nearest.pin.id, "near");
        assert_eq!(
            session.notice().unwrap().message,
            "Nearest bin is about 15.7 km away"
        );
        assert_eq!(session.last_known_position(), Some(Coordinate::new(0.0, 0.0)));
    }

    #[test]
    fn test_standing_at_only_bin() {
        let feed = MemoryPinFeed::with_records(vec![record("here", 10.0, 10.0)]);
        let mut session = session(&feed, FixedLocation::at(10.0, 10.0));

        let nearest = session.find_nearest().unwrap().unwrap();
        assert_eq!(nearest.pin.id, "here");
        assert_eq!(session.notice().unwrap().message, MSG_AT_BIN);
    }

    #[test]
    fn test_no_bins_notifies() {
        let feed = MemoryPinFeed::new();
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        assert_eq!(session.find_nearest(), Ok(None));
        assert_eq!(session.notice().unwrap().message, MSG_NO_BINS);
    }

    #[test]
    fn test_position_unavailable_notifies() {
        let feed = MemoryPinFeed::with_records(vec![record("r1", 1.0, 1.0)]);
        let mut session = session(&feed, FixedLocation::unavailable("timeout"));

        let err = session.find_nearest().unwrap_err();
        assert!(matches!(err, WasteMapError::PositionUnavailable { .. }));
        assert!(!err.is_blocking());
        assert_eq!(session.notice().unwrap().message, MSG_LOCATION_FAILED);

        assert!(session.on_pin_tap("r1"));
        assert!(session.start_journey().is_err());
        assert!(!session.registry().stats().journey_active);
        assert!(session.last_known_position().is_none());
    }

    struct OfflineFeed;

    impl RemotePinFeed for OfflineFeed {
        fn subscribe(&self, _callback: SnapshotCallback) -> Result<Subscription> {
            Err(WasteMapError::FeedError {
                message: "offline".to_string(),
            })
        }

        fn mark_removed(&self, _id: &str) -> Result<()> {
            Err(WasteMapError::FeedError {
                message: "offline".to_string(),
            })
        }
    }

    #[test]
    fn test_feed_failure_keeps_local_pins_usable() {
        let store = PinStore::new(Box::new(MemoryStorage::new()), Arc::new(OfflineFeed), "pins");
        let registry =
            PinRegistry::open(store, WasteMapConfig::default(), Arc::new(ManualClock::new()));
        let mut session = MapSession::open(
            registry,
            LocationAdapter::new(Box::new(FixedLocation::at(0.0, 0.0))),
        );

        assert!(session.is_open());
        assert!(!session.is_subscribed());
        assert_eq!(session.notice().unwrap().message, MSG_FEED_FAILED);

        let id = session.on_map_tap(Coordinate::new(0.01, 0.01)).unwrap();
        assert!(session.confirm_pending());
        let nearest = session.find_nearest().unwrap().unwrap();
        assert_eq!(nearest.pin.id, id);
    }

    #[test]
    fn test_tapping_walking_target_keeps_journey() {
        let feed = MemoryPinFeed::with_records(vec![record("r1", 0.01, 0.01)]);
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        assert!(session.on_pin_tap("r1"));
        session.start_journey().unwrap();
        assert!(session.on_pin_tap("r1"));
        assert!(session.registry().stats().journey_active);
    }

    #[test]
    fn test_permission_denied_notifies() {
        let feed = MemoryPinFeed::with_records(vec![record("r1", 1.0, 1.0)]);
        let mut session = session(&feed, FixedLocation::denied());

        let err = session.find_nearest().unwrap_err();
        assert!(err.is_blocking());
        assert_eq!(session.notice().unwrap().message, MSG_LOCATION_DENIED);

        let err = session.recenter().unwrap_err();
        assert!(err.is_blocking());
    }

    #[test]
    fn test_gesture_flow() {
        let feed = MemoryPinFeed::new();
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));

        let id = session.on_map_tap(Coordinate::new(0.002, 0.002)).unwrap();
        assert!(session.on_map_tap(Coordinate::new(0.003, 0.003)).is_err());
        assert!(!session.on_pin_tap(&id));
        assert!(session.confirm_pending());
        assert!(session.on_pin_tap(&id));

        let path = session.start_journey().unwrap();
        assert_eq!(path.points.len(), 3);
        assert!(session.cancel_journey());
    }

    #[test]
    fn test_teardown_cancels_subscription() {
        let feed = MemoryPinFeed::new();
        let mut session = session(&feed, FixedLocation::at(0.0, 0.0));
        assert_eq!(feed.subscriber_count(), 1);

        session.teardown();
        assert_eq!(feed.subscriber_count(), 0);
        assert!(!session.is_open());

        feed.upsert(record("r1", 1.0, 1.0));
        assert!(!session.pump_remote());
        assert!(session.registry().remote_pins().is_empty());

        assert_eq!(
            session.on_map_tap(Coordinate::new(1.0, 1.0)),
            Err(WasteMapError::SessionClosed)
        );
        assert!(!session.on_position_resolved(Coordinate::new(5.0, 5.0)));
        assert!(session.last_known_position().is_none());
    }

    #[test]
    fn test_drop_cancels_subscription() {
        let feed = MemoryPinFeed::new();
        {
            let _session = session(&feed, FixedLocation::at(0.0, 0.0));
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }
}
