//! Device location adapter.
//!
//! Positions are one-shot snapshots fetched on demand (recenter, nearest
//! search, journey start). The adapter remembers the last good fix so the
//! map can keep centering on it when a later request fails.

use log::{debug, warn};

use crate::{Coordinate, Result, WasteMapError};

/// Platform GPS access, implemented by the host app.
pub trait LocationProvider: Send {
    /// Fetch the current device position.
    ///
    /// Fails with `PermissionDenied` or `PositionUnavailable`.
    fn current_position(&self) -> Result<Coordinate>;
}

/// Provider that always answers with the same result.
///
/// Used by tests and by hosts running without a GPS (simulators).
#[derive(Debug, Clone)]
pub struct FixedLocation {
    result: Result<Coordinate>,
}

impl FixedLocation {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            result: Ok(Coordinate::new(latitude, longitude)),
        }
    }

    pub fn denied() -> Self {
        Self {
            result: Err(WasteMapError::PermissionDenied {
                resource: "location".to_string(),
            }),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            result: Err(WasteMapError::PositionUnavailable {
                message: message.to_string(),
            }),
        }
    }
}

impl LocationProvider for FixedLocation {
    fn current_position(&self) -> Result<Coordinate> {
        self.result.clone()
    }
}

/// Wraps a [`LocationProvider`] and tracks the last known position.
pub struct LocationAdapter {
    provider: Box<dyn LocationProvider>,
    last_known: Option<Coordinate>,
}

impl LocationAdapter {
    pub fn new(provider: Box<dyn LocationProvider>) -> Self {
        Self {
            provider,
            last_known: None,
        }
    }

    /// Request a fresh position from the provider.
    ///
    /// A provider answering with an out-of-range coordinate is reported as
    /// `PositionUnavailable`; the last known position is left untouched on
    /// any failure.
    pub fn refresh(&mut self) -> Result<Coordinate> {
        match self.provider.current_position() {
            Ok(position) if position.is_valid() => {
                debug!(
                    "[Location] Fix at ({:.5}, {:.5})",
                    position.latitude, position.longitude
                );
                self.last_known = Some(position);
                Ok(position)
            }
            Ok(position) => {
                warn!(
                    "[Location] Provider returned invalid coordinate ({}, {})",
                    position.latitude, position.longitude
                );
                Err(WasteMapError::PositionUnavailable {
                    message: "provider returned an invalid coordinate".to_string(),
                })
            }
            Err(e) => {
                warn!("[Location] Position request failed: {}", e);
                Err(e)
            }
        }
    }

    /// Record a position resolved outside [`refresh`](Self::refresh), e.g. by
    /// an asynchronous platform callback. Invalid coordinates are ignored.
    pub fn record(&mut self, position: Coordinate) -> bool {
        if !position.is_valid() {
            return false;
        }
        self.last_known = Some(position);
        true
    }

    /// Last position successfully obtained, if any.
    pub fn last_known(&self) -> Option<Coordinate> {
        self.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_updates_last_known() {
        let mut adapter = LocationAdapter::new(Box::new(FixedLocation::at(51.5, -0.12)));
        assert!(adapter.last_known().is_none());

        let position = adapter.refresh().unwrap();
        assert_eq!(position, Coordinate::new(51.5, -0.12));
        assert_eq!(adapter.last_known(), Some(position));
    }

    #[test]
    fn test_permission_denied_is_propagated() {
        let mut adapter = LocationAdapter::new(Box::new(FixedLocation::denied()));
        let err = adapter.refresh().unwrap_err();
        assert!(err.is_blocking());
        assert!(adapter.last_known().is_none());
    }

    #[test]
    fn test_record_external_fix() {
        let mut adapter = LocationAdapter::new(Box::new(FixedLocation::denied()));
        assert!(adapter.record(Coordinate::new(10.0, 20.0)));
        assert!(!adapter.record(Coordinate::new(f64::NAN, 20.0)));
        assert_eq!(adapter.last_known(), Some(Coordinate::new(10.0, 20.0)));
    }

    #[test]
    fn test_invalid_fix_is_unavailable() {
        let mut adapter = LocationAdapter::new(Box::new(FixedLocation::at(120.0, 0.0)));
        assert!(matches!(
            adapter.refresh(),
            Err(WasteMapError::PositionUnavailable { .. })
        ));
        assert!(adapter.last_known().is_none());
    }
}
