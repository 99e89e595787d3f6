//! Static node settings
//!
//! Loaded once at start-up from a JSON file. Everything here is fixed for
//! the process lifetime; the one runtime-tunable value (the sampling
//! interval) is only the *initial* value handed to [`crate::ConfigManager`].

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// GPIO assignment of the board peripherals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    pub dht: u8,
    pub light: u8,
    pub red: u8,
    pub yellow: u8,
    pub green: u8,
    pub trigger: u8,
    pub echo: u8,
    pub button: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            dht: 21,
            light: 34,
            red: 13,
            yellow: 12,
            green: 27,
            trigger: 32,
            echo: 15,
            button: 14,
        }
    }
}

/// Node settings file (`node.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSettings {
    /// UDP address the CoAP server binds to
    pub bind: SocketAddr,
    /// Receive timeout between observer change checks
    pub poll_interval_ms: u64,
    /// Initial sampling interval, until changed through `/config`
    pub sampling_interval_seconds: u32,
    /// Distance from the sensor to the bin floor
    pub max_bin_height_cm: f64,
    /// Minimum gap between two accepted button presses
    pub button_debounce_ms: u64,
    pub pins: PinMap,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5683)),
            poll_interval_ms: 1000,
            sampling_interval_seconds: 10,
            max_bin_height_cm: 100.0,
            button_debounce_ms: 50,
            pins: PinMap::default(),
        }
    }
}

impl NodeSettings {
    /// Parse settings from the given path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse settings from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let settings: NodeSettings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(NodeError::InvalidSettings(
                "pollIntervalMs must be positive".into(),
            ));
        }
        if self.sampling_interval_seconds == 0 {
            return Err(NodeError::InvalidSettings(
                "samplingIntervalSeconds must be positive".into(),
            ));
        }
        if !(self.max_bin_height_cm > 0.0) {
            return Err(NodeError::InvalidSettings(format!(
                "maxBinHeightCm must be positive, got {}",
                self.max_bin_height_cm
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(self.button_debounce_ms)
    }
}

impl std::str::FromStr for NodeSettings {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_gives_defaults() {
        let settings: NodeSettings = "{}".parse().unwrap();
        assert_eq!(settings, NodeSettings::default());
        assert_eq!(settings.bind.port(), 5683);
        assert_eq!(settings.sampling_interval_seconds, 10);
    }

    #[test]
    fn test_partial_override() {
        let settings: NodeSettings =
            r#"{"bind": "127.0.0.1:5684", "pollIntervalMs": 250, "pins": {"red": 2}}"#
                .parse()
                .unwrap();
        assert_eq!(settings.bind, "127.0.0.1:5684".parse().unwrap());
        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.pins.red, 2);
        assert_eq!(settings.pins.yellow, 12);
    }

    #[test]
    fn test_rejects_zero_intervals() {
        assert!(matches!(
            r#"{"samplingIntervalSeconds": 0}"#.parse::<NodeSettings>(),
            Err(NodeError::InvalidSettings(_))
        ));
        assert!(matches!(
            r#"{"pollIntervalMs": 0}"#.parse::<NodeSettings>(),
            Err(NodeError::InvalidSettings(_))
        ));
        assert!(matches!(
            r#"{"maxBinHeightCm": -1.0}"#.parse::<NodeSettings>(),
            Err(NodeError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"samplingIntervalSeconds": 30}}"#).unwrap();

        let settings = NodeSettings::load(file.path()).unwrap();
        assert_eq!(settings.sampling_interval_seconds, 30);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeSettings::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(NodeError::Io(_))));
    }
}
