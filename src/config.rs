//! Runtime configuration.
//!
//! All values have defaults matching the shipped app. Hosts may override
//! any subset from JSON; missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::{Result, WasteMapError, KM_PER_DEGREE};

/// Top-level configuration for the pin registry and its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasteMapConfig {
    /// Multiplier converting degree distance to indicative kilometres.
    /// Default: 111.0
    pub km_per_degree: f64,

    /// Skip pins lying exactly at the user's position during nearest search.
    /// Default: true
    pub exclude_coincident: bool,

    /// Device storage key holding the local pin cache.
    /// Default: "pins"
    pub storage_key: String,

    /// Status notice timing.
    pub notifier: NotifierConfig,

    /// Label classification settings.
    pub classifier: ClassifierConfig,
}

impl Default for WasteMapConfig {
    fn default() -> Self {
        Self {
            km_per_degree: KM_PER_DEGREE,
            exclude_coincident: true,
            storage_key: "pins".to_string(),
            notifier: NotifierConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl WasteMapConfig {
    /// Parse a JSON configuration, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| WasteMapError::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the registry cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.km_per_degree.is_finite() && self.km_per_degree > 0.0) {
            return Err(WasteMapError::ConfigError {
                message: format!("km_per_degree must be positive, got {}", self.km_per_degree),
            });
        }
        if self.storage_key.is_empty() {
            return Err(WasteMapError::ConfigError {
                message: "storage_key must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return Err(WasteMapError::ConfigError {
                message: format!(
                    "min_confidence must be within 0..=1, got {}",
                    self.classifier.min_confidence
                ),
            });
        }
        Ok(())
    }
}

/// Timing of transient status notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Time a notice stays at full opacity.
    /// Default: 2000 ms
    pub visible_ms: u64,

    /// Fade-out duration after the visible window.
    /// Default: 300 ms
    pub fade_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            visible_ms: 2000,
            fade_ms: 300,
        }
    }
}

/// Settings for the vision label API and keyword classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Label-detection endpoint.
    /// Default: Google Cloud Vision `images:annotate`
    pub endpoint: String,

    /// Maximum labels requested per image.
    /// Default: 10
    pub max_labels: u32,

    /// Labels scoring below this are ignored. The shipped app uses every
    /// label regardless of score.
    /// Default: 0.0
    pub min_confidence: f64,

    /// Request timeout in seconds.
    /// Default: 30
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            max_labels: 10,
            min_confidence: 0.0,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WasteMapConfig::default();
        assert_eq!(config.km_per_degree, 111.0);
        assert_eq!(config.notifier.visible_ms, 2000);
        assert_eq!(config.notifier.fade_ms, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WasteMapConfig::from_json(r#"{"storage_key": "bins", "notifier": {"fade_ms": 500}}"#)
            .unwrap();
        assert_eq!(config.storage_key, "bins");
        assert_eq!(config.notifier.fade_ms, 500);
        assert_eq!(config.notifier.visible_ms, 2000);
        assert_eq!(config.km_per_degree, 111.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            WasteMapConfig::from_json(r#"{"km_per_degree": -1.0}"#),
            Err(WasteMapError::ConfigError { .. })
        ));
        assert!(matches!(
            WasteMapConfig::from_json(r#"{"classifier": {"min_confidence": 2.0}}"#),
            Err(WasteMapError::ConfigError { .. })
        ));
        assert!(WasteMapConfig::from_json("not json").is_err());
    }
}
