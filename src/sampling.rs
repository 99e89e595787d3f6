//! Periodic sensor sampling

use std::time::Duration;

use log::{info, warn};

use crate::config::ConfigManager;
use crate::sensors::SensorManager;

/// Drives one sample per cycle and reports how long to wait for the next.
///
/// The interval is read from [`ConfigManager`] after sampling, so a change
/// made through `/config` applies from the next sleep on.
#[derive(Debug, Default)]
pub struct SamplingLoop {
    cycles: u64,
    failures: u64,
}

impl SamplingLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample once and return the delay until the next cycle
    pub fn run_cycle(&mut self, sensors: &mut SensorManager, config: &ConfigManager) -> Duration {
        self.cycles += 1;
        match sensors.sample() {
            Ok(reading) => info!(
                "Sample #{}: temperature={:?} humidity={:?} light={:?} bin={:?}",
                self.cycles,
                reading.temperature,
                reading.humidity,
                reading.light_level,
                reading.bin_level
            ),
            Err(e) => {
                self.failures += 1;
                warn!("Sample #{} failed: {}", self.cycles, e);
            }
        }
        Duration::from_secs(u64::from(config.get().sampling_interval_seconds))
    }

    /// Cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Cycles whose sample was rejected
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::hardware::{ClimateSample, SimulatedLeds, SimulatedSensors};
    use crate::settings::PinMap;
    use serde_json::{Map, Value};

    fn manager(sensors: SimulatedSensors) -> SensorManager {
        SensorManager::new(
            sensors,
            SimulatedLeds::new(&PinMap::default()),
            100.0,
        )
    }

    #[test]
    fn test_cycle_publishes_reading() {
        let mut sensors = manager(SimulatedSensors::steady(
            Some(ClimateSample {
                temperature: 21.5,
                humidity: 40.0,
            }),
            Some(512),
            Some(25.0),
        ));
        let config = ConfigManager::new(RuntimeConfig::default());
        let mut sampling = SamplingLoop::new();

        let delay = sampling.run_cycle(&mut sensors, &config);

        assert_eq!(delay, Duration::from_secs(10));
        assert_eq!(sampling.cycles(), 1);
        assert_eq!(sampling.failures(), 0);
        let reading = sensors.last_reading().unwrap();
        assert_eq!(reading.light_level, Some(512));
        assert_eq!(reading.bin_level, Some(75.0));
    }

    #[test]
    fn test_failed_cycle_keeps_running() {
        let mut sensors = manager(SimulatedSensors::steady(None, None, None));
        let config = ConfigManager::new(RuntimeConfig::default());
        let mut sampling = SamplingLoop::new();

        assert_eq!(sampling.run_cycle(&mut sensors, &config), Duration::from_secs(10));
        assert_eq!(sampling.failures(), 1);
        assert!(sensors.last_reading().is_none());
    }

    #[test]
    fn test_interval_follows_config() {
        let mut sensors = manager(SimulatedSensors::steady(None, Some(1), None));
        let mut config = ConfigManager::new(RuntimeConfig::default());
        let mut sampling = SamplingLoop::new();

        let mut partial = Map::new();
        partial.insert("samplingIntervalSeconds".into(), Value::from(3));
        config.update(&partial);

        assert_eq!(sampling.run_cycle(&mut sensors, &config), Duration::from_secs(3));
    }
}
