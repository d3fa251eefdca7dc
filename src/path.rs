//! Walking paths from the user to a selected bin.
//!
//! The default builder draws a straight line through the midpoint. A real
//! routing collaborator can replace it behind [`PathBuilder`] as long as it
//! returns an ordered sequence from origin to destination.

use serde::{Deserialize, Serialize};

use crate::Coordinate;

/// Ordered path from origin to destination (at least two points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WalkPath {
    pub points: Vec<Coordinate>,
}

impl WalkPath {
    pub fn origin(&self) -> Option<Coordinate> {
        self.points.first().copied()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }

    /// Great-circle length in kilometres, for display.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].haversine_distance(&w[1]))
            .sum::<f64>()
            / 1000.0
    }

    /// Flatten to [lat1, lng1, lat2, lng2, ...] for map line layers.
    pub fn to_flat(&self) -> Vec<f64> {
        self.points
            .iter()
            .flat_map(|p| [p.latitude, p.longitude])
            .collect()
    }
}

/// Produces a renderable path between two coordinates.
pub trait PathBuilder: Send {
    fn build(&self, origin: Coordinate, destination: Coordinate) -> WalkPath;
}

/// Straight line with the midpoint interpolated. Not a road-network route.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLinePath;

impl PathBuilder for StraightLinePath {
    fn build(&self, origin: Coordinate, destination: Coordinate) -> WalkPath {
        build_path(origin, destination)
    }
}

/// Arithmetic mean of two coordinates.
pub fn midpoint(a: Coordinate, b: Coordinate) -> Coordinate {
    Coordinate::new(
        (a.latitude + b.latitude) / 2.0,
        (a.longitude + b.longitude) / 2.0,
    )
}

/// `[origin, midpoint, destination]`.
pub fn build_path(origin: Coordinate, destination: Coordinate) -> WalkPath {
    WalkPath {
        points: vec![origin, midpoint(origin, destination), destination],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_path() {
        let origin = Coordinate::new(0.0, 0.0);
        let destination = Coordinate::new(2.0, -4.0);
        let path = build_path(origin, destination);

        assert_eq!(path.points.len(), 3);
        assert_eq!(path.origin(), Some(origin));
        assert_eq!(path.points[1], Coordinate::new(1.0, -2.0));
        assert_eq!(path.destination(), Some(destination));
    }

    #[test]
    fn test_same_point_path() {
        let here = Coordinate::new(51.5, -0.1);
        let path = StraightLinePath.build(here, here);
        assert_eq!(path.points, vec![here, here, here]);
        assert_eq!(path.length_km(), 0.0);
    }

    #[test]
    fn test_length_and_flat() {
        let path = build_path(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((path.length_km() - 111.2).abs() < 0.5);
        assert_eq!(path.to_flat(), vec![0.0, 0.0, 0.5, 0.0, 1.0, 0.0]);
    }
}
