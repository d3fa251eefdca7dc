//! Unified error handling for the waste-map library.
//!
//! Every fallible operation returns [`WasteMapError`]. Unknown pin ids are
//! not errors: operations on them return `false`.

use std::fmt;

/// Unified error type for waste-map operations.
#[derive(Debug, Clone, PartialEq)]
pub enum WasteMapError {
    /// The user has not granted access to location or camera
    PermissionDenied { resource: String },
    /// The location provider could not produce a fix
    PositionUnavailable { message: String },
    /// A coordinate is outside the valid lat/lng range or not finite
    InvalidCoordinate { latitude: f64, longitude: f64 },
    /// A new pin was placed while another one still awaits confirmation
    PlacementPending { pending_id: String },
    /// Pin exists but is not in a state that allows selection
    NotSelectable { pin_id: String, status: String },
    /// A navigation action needs a selected pin
    NoSelection,
    /// The owning map session has been torn down
    SessionClosed,
    /// Device storage read/write failed
    StorageError { message: String },
    /// Local cache or remote record could not be (de)serialized
    SerializationError { message: String },
    /// Remote pin feed rejected an operation
    FeedError { message: String },
    /// HTTP/API error
    HttpError {
        message: String,
        status_code: Option<u16>,
    },
    /// Configuration error
    ConfigError { message: String },
}

impl fmt::Display for WasteMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasteMapError::PermissionDenied { resource } => {
                write!(f, "Permission to use {} was denied", resource)
            }
            WasteMapError::PositionUnavailable { message } => {
                write!(f, "Position unavailable: {}", message)
            }
            WasteMapError::InvalidCoordinate {
                latitude,
                longitude,
            } => {
                write!(f, "Invalid coordinate ({}, {})", latitude, longitude)
            }
            WasteMapError::PlacementPending { pending_id } => {
                write!(
                    f,
                    "Pin '{}' is still waiting for confirmation",
                    pending_id
                )
            }
            WasteMapError::NotSelectable { pin_id, status } => {
                write!(f, "Pin '{}' cannot be selected while {}", pin_id, status)
            }
            WasteMapError::NoSelection => write!(f, "No pin is selected"),
            WasteMapError::SessionClosed => write!(f, "Map session has been closed"),
            WasteMapError::StorageError { message } => {
                write!(f, "Storage error: {}", message)
            }
            WasteMapError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            WasteMapError::FeedError { message } => {
                write!(f, "Remote feed error: {}", message)
            }
            WasteMapError::HttpError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "HTTP error ({}): {}", code, message)
                } else {
                    write!(f, "HTTP error: {}", message)
                }
            }
            WasteMapError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for WasteMapError {}

impl WasteMapError {
    /// Whether this error must block the feature until the user acts
    /// (grants a permission), as opposed to a transient failure.
    pub fn is_blocking(&self) -> bool {
        matches!(self, WasteMapError::PermissionDenied { .. })
    }
}

impl From<serde_json::Error> for WasteMapError {
    fn from(err: serde_json::Error) -> Self {
        WasteMapError::SerializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for WasteMapError {
    fn from(err: rusqlite::Error) -> Self {
        WasteMapError::StorageError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for waste-map operations.
pub type Result<T> = std::result::Result<T, WasteMapError>;

/// Extension trait for converting Option to WasteMapError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a no-selection error.
    fn ok_or_no_selection(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_no_selection(self) -> Result<T> {
        self.ok_or(WasteMapError::NoSelection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WasteMapError::PlacementPending {
            pending_id: "pin-1".to_string(),
        };
        assert!(err.to_string().contains("pin-1"));

        let err = WasteMapError::HttpError {
            message: "quota".to_string(),
            status_code: Some(429),
        };
        assert_eq!(err.to_string(), "HTTP error (429): quota");
    }

    #[test]
    fn test_blocking_errors() {
        assert!(WasteMapError::PermissionDenied {
            resource: "location".to_string()
        }
        .is_blocking());
        assert!(!WasteMapError::PositionUnavailable {
            message: "timeout".to_string()
        }
        .is_blocking());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        assert_eq!(none.ok_or_no_selection(), Err(WasteMapError::NoSelection));
        assert_eq!(Some(3).ok_or_no_selection(), Ok(3));
    }

    #[test]
    fn test_from_serde_error() {
        let err: WasteMapError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, WasteMapError::SerializationError { .. }));
    }
}
