//! Pin data model and the remote feed record shape.

use serde::{Deserialize, Serialize};

use crate::Coordinate;

/// Lifecycle state of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PinStatus {
    /// Dropped on the map, awaiting confirmation
    Placed,
    /// Accepted as a permanent bin marker
    Confirmed,
    /// Bin no longer exists in the physical world
    Removed,
    /// Target of the active walking journey
    Walking,
}

impl PinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinStatus::Placed => "placed",
            PinStatus::Confirmed => "confirmed",
            PinStatus::Removed => "removed",
            PinStatus::Walking => "walking",
        }
    }
}

/// Where a pin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PinSource {
    /// Placed on this device
    Local,
    /// Synced from the shared bin collection
    Remote,
}

/// Extra fields carried by pins synced from the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RemoteAttributes {
    pub user_id: String,
    pub image_url: String,
    pub landfill: bool,
    pub compost: bool,
    pub recycling: bool,
    pub paper: bool,
}

/// A bin marker on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Pin {
    pub id: String,
    pub coordinate: Coordinate,
    pub status: PinStatus,
    pub source: PinSource,
    /// Unix timestamp (seconds since epoch)
    pub created_at: i64,
    /// Present for remote pins only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteAttributes>,
}

impl Pin {
    /// Create a freshly placed local pin.
    pub fn placed(id: String, coordinate: Coordinate, created_at: i64) -> Self {
        Self {
            id,
            coordinate,
            status: PinStatus::Placed,
            source: PinSource::Local,
            created_at,
            remote: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.source == PinSource::Local
    }

    /// Removed pins stay in history but never take part in search or display.
    pub fn is_active(&self) -> bool {
        self.status != PinStatus::Removed
    }
}

/// Document shape of a bin in the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RemotePinRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub image_url: String,
    /// Unix timestamp (seconds since epoch)
    #[serde(default)]
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub landfill: bool,
    #[serde(default)]
    pub compost: bool,
    #[serde(default)]
    pub recycling: bool,
    #[serde(default)]
    pub paper: bool,
    #[serde(default)]
    pub confirm: bool,
    /// Soft-delete flag: the bin was reported gone
    #[serde(default)]
    pub removed: bool,
}

impl RemotePinRecord {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Convert to an in-memory pin.
    pub fn to_pin(&self) -> Pin {
        let status = if self.removed {
            PinStatus::Removed
        } else if self.confirm {
            PinStatus::Confirmed
        } else {
            PinStatus::Placed
        };

        Pin {
            id: self.id.clone(),
            coordinate: self.coordinate(),
            status,
            source: PinSource::Remote,
            created_at: self.timestamp,
            remote: Some(RemoteAttributes {
                user_id: self.user_id.clone(),
                image_url: self.image_url.clone(),
                landfill: self.landfill,
                compost: self.compost,
                recycling: self.recycling,
                paper: self.paper,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_feed_json() {
        let json = r#"{
            "id": "doc-1",
            "userId": "u-9",
            "imageUrl": "https://img.example/1.jpg",
            "timestamp": 1700000000,
            "latitude": 37.87,
            "longitude": -122.26,
            "recycling": true,
            "confirm": true
        }"#;
        let record: RemotePinRecord = serde_json::from_str(json).unwrap();
        assert!(!record.landfill);
        assert!(!record.removed);

        let pin = record.to_pin();
        assert_eq!(pin.status, PinStatus::Confirmed);
        assert_eq!(pin.source, PinSource::Remote);
        assert_eq!(pin.created_at, 1_700_000_000);
        let remote = pin.remote.unwrap();
        assert_eq!(remote.user_id, "u-9");
        assert!(remote.recycling);
    }

    #[test]
    fn test_record_status_mapping() {
        let mut record: RemotePinRecord =
            serde_json::from_str(r#"{"id": "a", "latitude": 1.0, "longitude": 2.0}"#).unwrap();
        assert_eq!(record.to_pin().status, PinStatus::Placed);

        record.confirm = true;
        record.removed = true;
        assert_eq!(record.to_pin().status, PinStatus::Removed);
        assert!(!record.to_pin().is_active());
    }

    #[test]
    fn test_local_pin_serialization() {
        let pin = Pin::placed("p1".to_string(), Coordinate::new(1.0, 2.0), 10);
        let json = serde_json::to_string(&pin).unwrap();
        assert!(json.contains("\"placed\""));
        assert!(!json.contains("remote"));

        let back: Pin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pin);
    }
}
