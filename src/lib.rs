//! # Waste Map
//!
//! Core logic for the waste-sorting assistant: bin pins on a live map,
//! nearest-bin search and photo label classification.
//!
//! This library provides:
//! - A pin registry enforcing the placed/confirmed/removed/walking lifecycle
//! - Straight-line nearest-pin search and walking paths to a selected bin
//! - Transient status notices with a fixed visible window and fade
//! - Keyword-based waste categorization of vision API labels
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed device storage for local pins
//! - **`http`** - HTTP client for the cloud vision label API
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use waste_map::{
//!     Coordinate, MemoryPinFeed, MemoryStorage, PinRegistry, PinStore, SystemClock,
//!     WasteMapConfig,
//! };
//!
//! let store = PinStore::new(
//!     Box::new(MemoryStorage::new()),
//!     Arc::new(MemoryPinFeed::new()),
//!     "pins",
//! );
//! let mut registry =
//!     PinRegistry::open(store, WasteMapConfig::default(), Arc::new(SystemClock));
//!
//! let id = registry.add_pin(Coordinate::new(51.5080, -0.1290)).unwrap();
//! registry.confirm_pin(&id);
//!
//! let nearest = registry.find_nearest(Coordinate::new(51.5074, -0.1278)).unwrap();
//! assert_eq!(nearest.pin.id, id);
//! ```

use geo::{Distance, Euclidean, Haversine, Point};
use rstar::{RTreeObject, AABB};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, WasteMapError};

// Runtime configuration
pub mod config;
pub use config::{ClassifierConfig, NotifierConfig, WasteMapConfig};

// Device location adapter
pub mod location;
pub use location::{FixedLocation, LocationAdapter, LocationProvider};

// Pin data model
pub mod pin;
pub use pin::{Pin, PinSource, PinStatus, RemoteAttributes, RemotePinRecord};

// Local storage and remote feed
pub mod store;
pub use store::{
    KeyValueStorage, MemoryPinFeed, MemoryStorage, PinStore, RemotePinFeed, SnapshotCallback,
    Subscription,
};
#[cfg(feature = "persistence")]
pub use store::SqliteStorage;

// Walking paths
pub mod path;
pub use path::{build_path, midpoint, PathBuilder, StraightLinePath, WalkPath};

// Transient status messages
pub mod notifier;
pub use notifier::{Clock, ManualClock, Notice, NoticePhase, StatusNotifier, SystemClock};

// Pin lifecycle and nearest search
pub mod registry;
pub use registry::{NearestPin, PinRegistry, RegistryStats};

// Map presentation bridge
pub mod session;
pub use session::MapSession;

// Label-to-category classification
pub mod classify;
pub use classify::{classify_labels, classify_scored, ClassifyMode, Label, WasteCategory};

// HTTP client for the vision label API
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::VisionClient;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("WasteMapRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

/// Kilometres per degree used for the flat-earth distance approximation.
///
/// Good enough to rank nearby bins; not suitable for absolute distances
/// over long ranges or at high latitudes.
pub const KM_PER_DEGREE: f64 = 111.0;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use waste_map::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the coordinate is finite and inside the lat/lng range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Straight-line distance in degree space (planar, no projection).
    pub fn degree_distance(&self, other: &Coordinate) -> f64 {
        Euclidean::distance(self.to_point(), other.to_point())
    }

    /// Great-circle distance in meters.
    pub fn haversine_distance(&self, other: &Coordinate) -> f64 {
        Haversine::distance(self.to_point(), other.to_point())
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Bounding box of the visible map region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// R-tree envelope in (lng, lat) order.
    pub(crate) fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

// ============================================================================
// Spatial Indexing Types
// ============================================================================

/// Pin position wrapper for R-tree viewport queries.
#[derive(Debug, Clone)]
pub(crate) struct PinLocation {
    pub pin_id: String,
    pub coordinate: Coordinate,
}

impl RTreeObject for PinLocation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.coordinate.longitude, self.coordinate.latitude])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5074, -0.1278).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_degree_distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert!((a.degree_distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.degree_distance(&a), 0.0);
    }

    #[test]
    fn test_haversine_distance() {
        // One degree of latitude is roughly 111 km
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let meters = a.haversine_distance(&b);
        assert!((meters - 111_195.0).abs() < 500.0, "got {}", meters);
    }

    #[test]
    fn test_bounds_envelope_is_lng_lat() {
        let bounds = Bounds {
            min_lat: 51.50,
            max_lat: 51.52,
            min_lng: -0.13,
            max_lng: -0.10,
        };
        let envelope = bounds.envelope();
        assert_eq!(envelope.lower(), [-0.13, 51.50]);
        assert_eq!(envelope.upper(), [-0.10, 51.52]);
    }
}
