//! Runtime configuration
//!
//! The single authoritative copy of [`RuntimeConfig`]. Only the `/config`
//! PUT handler writes it; the sampling loop reads it once per cycle.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire key of the sampling interval
pub const SAMPLING_INTERVAL_KEY: &str = "samplingIntervalSeconds";
/// Key used by older firmware clients
pub const LEGACY_SAMPLING_INTERVAL_KEY: &str = "sampling_interval";

/// Parameters clients may change while the node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub sampling_interval_seconds: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sampling_interval_seconds: 10,
        }
    }
}

/// Owner of the runtime configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    config: RuntimeConfig,
}

impl ConfigManager {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn get(&self) -> RuntimeConfig {
        self.config
    }

    /// Merge recognised keys from `partial` and return the result.
    ///
    /// Unknown keys and values that are not positive `u32` integers are
    /// ignored. The camelCase key wins over the legacy key.
    pub fn update(&mut self, partial: &Map<String, Value>) -> RuntimeConfig {
        for key in [LEGACY_SAMPLING_INTERVAL_KEY, SAMPLING_INTERVAL_KEY] {
            let Some(value) = partial.get(key) else {
                continue;
            };
            match positive_u32(value) {
                Some(seconds) => self.config.sampling_interval_seconds = seconds,
                None => warn!("Ignoring {} = {}: not a positive integer", key, value),
            }
        }
        self.config
    }
}

fn positive_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}
