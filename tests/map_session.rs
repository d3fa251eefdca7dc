//! End-to-end map screen flows through the public API.

use std::sync::Arc;
use std::time::Duration;

use waste_map::{
    classify_labels, ClassifyMode, Coordinate, FixedLocation, LocationAdapter, ManualClock,
    MapSession, MemoryPinFeed, MemoryStorage, NoticePhase, PinRegistry, PinStatus, PinStore,
    RemotePinRecord, WasteCategory, WasteMapConfig,
};

fn record(id: &str, lat: f64, lng: f64) -> RemotePinRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "userId": "someone-else",
        "imageUrl": "https://example.invalid/bin.jpg",
        "timestamp": 1_700_000_000,
        "latitude": lat,
        "longitude": lng,
        "recycling": true,
        "confirm": true
    }))
    .unwrap()
}

struct Harness {
    storage: MemoryStorage,
    feed: MemoryPinFeed,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        Self {
            storage: MemoryStorage::new(),
            feed: MemoryPinFeed::new(),
            clock: Arc::new(ManualClock::new()),
        }
    }

    fn open(&self, location: FixedLocation) -> MapSession {
        let store = PinStore::new(
            Box::new(self.storage.clone()),
            Arc::new(self.feed.clone()),
            "pins",
        );
        let registry = PinRegistry::open(store, WasteMapConfig::default(), self.clock.clone());
        MapSession::open(registry, LocationAdapter::new(Box::new(location)))
    }
}

#[test]
fn nearest_bin_skips_the_bin_under_the_user() {
    let harness = Harness::new();
    harness.feed.upsert(record("origin", 0.0, 0.0));
    harness.feed.upsert(record("far", 1.0, 1.0));
    harness.feed.upsert(record("near", 0.1, 0.1));

    let mut session = harness.open(FixedLocation::at(0.0, 0.0));
    let nearest = session.find_nearest().unwrap().unwrap();

    assert_eq!(nearest.pin.id, "near");
    assert!((nearest.distance_km - 15.7).abs() < 0.01);
}

#[test]
fn pins_survive_reopening_the_map() {
    let harness = Harness::new();
    let id = {
        let mut session = harness.open(FixedLocation::at(0.0, 0.0));
        let id = session.on_map_tap(Coordinate::new(0.01, 0.01)).unwrap();
        assert!(session.confirm_pending());
        id
    };

    let session = harness.open(FixedLocation::at(0.0, 0.0));
    let pin = session.registry().get_pin(&id).unwrap();
    assert_eq!(pin.status, PinStatus::Confirmed);
    assert!(pin.is_local());
}

#[test]
fn pending_pin_blocks_new_placement() {
    let harness = Harness::new();
    let mut session = harness.open(FixedLocation::at(0.0, 0.0));

    let first = session.on_map_tap(Coordinate::new(0.01, 0.01)).unwrap();
    assert!(session.on_map_tap(Coordinate::new(0.02, 0.02)).is_err());

    assert!(session.remove_pin(&first));
    assert!(session.on_map_tap(Coordinate::new(0.02, 0.02)).is_ok());
}

#[test]
fn later_notice_replaces_earlier_one() {
    let harness = Harness::new();
    let mut session = harness.open(FixedLocation::at(0.0, 0.0));

    session.on_map_tap(Coordinate::new(0.01, 0.01)).unwrap();
    assert_eq!(session.notice().unwrap().message, "Pin added");

    harness.clock.advance(Duration::from_millis(1500));
    session.confirm_pending();
    assert_eq!(session.notice().unwrap().message, "Pin confirmed");

    // The first notice would have started fading here
    harness.clock.advance(Duration::from_millis(600));
    let notice = session.notice().unwrap();
    assert_eq!(notice.message, "Pin confirmed");
    assert_eq!(notice.phase, NoticePhase::Visible);

    harness.clock.advance(Duration::from_millis(1800));
    assert!(session.notice().is_none());
}

#[test]
fn walking_target_survives_remote_updates() {
    let harness = Harness::new();
    harness.feed.upsert(record("bin", 0.01, 0.01));

    let mut session = harness.open(FixedLocation::at(0.0, 0.0));
    assert!(session.on_pin_tap("bin"));
    let path = session.start_journey().unwrap();
    assert_eq!(path.destination(), Some(Coordinate::new(0.01, 0.01)));

    harness.feed.upsert(record("other", 0.5, 0.5));
    session.pump_remote();
    assert_eq!(
        session.registry().get_pin("bin").unwrap().status,
        PinStatus::Walking
    );

    assert!(harness.feed.delete("bin"));
    session.pump_remote();
    assert!(session.registry().get_pin("bin").is_none());
    assert!(!session.registry().stats().journey_active);
}

#[test]
fn closing_the_map_stops_remote_updates() {
    let harness = Harness::new();
    let mut session = harness.open(FixedLocation::at(0.0, 0.0));
    assert_eq!(harness.feed.subscriber_count(), 1);

    session.teardown();
    assert_eq!(harness.feed.subscriber_count(), 0);

    harness.feed.upsert(record("late", 1.0, 1.0));
    assert!(!session.pump_remote());
}

#[test]
fn photo_labels_pick_a_bin() {
    assert_eq!(
        classify_labels(&["banana peel"], ClassifyMode::Trash),
        Some(WasteCategory::Compost)
    );
    assert_eq!(
        classify_labels(&["plastic bag", "aluminum can"], ClassifyMode::Trash),
        Some(WasteCategory::Landfill)
    );
}
