//! Sensor and actuator state
//!
//! [`SensorManager`] is the only owner of the cached [`SensorReading`] and of
//! the authoritative [`ActuatorState`]. Every LED change, whether it comes
//! from a PUT or from the button, goes through [`SensorManager::set_actuator_state`].

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};
use crate::hardware::{Led, LedBank, SensorBus};

/// On/off state of the three LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActuatorState {
    pub red_led: bool,
    pub yellow_led: bool,
    pub green_led: bool,
}

impl ActuatorState {
    pub fn level(&self, led: Led) -> bool {
        match led {
            Led::Red => self.red_led,
            Led::Yellow => self.yellow_led,
            Led::Green => self.green_led,
        }
    }
}

/// One published sample. Absent fields encode as CBOR null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_level: Option<u16>,
    pub bin_level: Option<f64>,
    pub led_states: ActuatorState,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(D::Error::custom)
    }
}

/// Fill percentage of the bin, rounded to two decimals.
///
/// `None` when the echo lands outside `0..=max_height_cm` (nothing in range).
pub fn bin_fill_percent(distance_cm: f64, max_height_cm: f64) -> Option<f64> {
    if !(0.0..=max_height_cm).contains(&distance_cm) {
        return None;
    }
    let percent = (max_height_cm - distance_cm) / max_height_cm * 100.0;
    Some((percent * 100.0).round() / 100.0)
}

/// Owner of the hardware collaborators and the state read from / written to them
pub struct SensorManager {
    sensors: Box<dyn SensorBus>,
    leds: Box<dyn LedBank>,
    max_bin_height_cm: f64,
    actuators: ActuatorState,
    last_reading: Option<SensorReading>,
}

impl std::fmt::Debug for SensorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorManager")
            .field("max_bin_height_cm", &self.max_bin_height_cm)
            .field("actuators", &self.actuators)
            .field("last_reading", &self.last_reading)
            .finish_non_exhaustive()
    }
}

impl SensorManager {
    /// Create a manager; LEDs start off and nothing has been sampled yet
    pub fn new(
        sensors: impl SensorBus + 'static,
        leds: impl LedBank + 'static,
        max_bin_height_cm: f64,
    ) -> Self {
        Self {
            sensors: Box::new(sensors),
            leds: Box::new(leds),
            max_bin_height_cm,
            actuators: ActuatorState::default(),
            last_reading: None,
        }
    }

    /// Read every sensor and publish the result.
    ///
    /// A failing channel leaves its field empty. Only when every channel
    /// fails is the sample rejected, and then the previous reading stays.
    pub fn sample(&mut self) -> Result<SensorReading> {
        let mut failures = 0;

        let (temperature, humidity) = match self.sensors.read_climate() {
            Ok(climate) => (Some(climate.temperature), Some(climate.humidity)),
            Err(e) => {
                warn!("Climate read failed: {}", e);
                failures += 1;
                (None, None)
            }
        };

        let light_level = match self.sensors.read_light() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!("Light read failed: {}", e);
                failures += 1;
                None
            }
        };

        let bin_level = match self.sensors.read_distance_cm() {
            Ok(distance) => bin_fill_percent(distance, self.max_bin_height_cm),
            Err(e) => {
                warn!("Distance read failed: {}", e);
                failures += 1;
                None
            }
        };

        if failures == 3 {
            return Err(NodeError::SampleFailed);
        }

        let reading = SensorReading {
            timestamp: chrono::Local::now().naive_local(),
            temperature,
            humidity,
            light_level,
            bin_level,
            led_states: self.actuators,
        };
        self.last_reading = Some(reading.clone());
        Ok(reading)
    }

    /// Last published sample, if any
    pub fn last_reading(&self) -> Option<&SensorReading> {
        self.last_reading.as_ref()
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.actuators
    }

    /// Drive every LED to `new` and only then record it.
    ///
    /// If a write fails, LEDs already switched are put back and the
    /// recorded state is left untouched.
    pub fn set_actuator_state(&mut self, new: ActuatorState) -> Result<ActuatorState> {
        let previous = self.actuators;

        for (written, led) in Led::ALL.into_iter().enumerate() {
            if let Err(e) = self.leds.write(led, new.level(led)) {
                for restored in Led::ALL.into_iter().take(written) {
                    if let Err(rollback) = self.leds.write(restored, previous.level(restored)) {
                        warn!("Failed to restore {} LED: {}", restored, rollback);
                    }
                }
                return Err(e);
            }
        }

        debug!("Actuator state {:?} -> {:?}", previous, new);
        self.actuators = new;
        Ok(new)
    }

    /// Flip the red LED, keeping the other two
    pub fn toggle_red(&mut self) -> Result<ActuatorState> {
        let mut next = self.actuators;
        next.red_led = !next.red_led;
        self.set_actuator_state(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{ClimateSample, SimulatedLeds, SimulatedSensors};
    use crate::settings::PinMap;
    use std::sync::{Arc, Mutex};

    /// Sensor bus whose channels can be broken after construction
    #[derive(Clone, Default)]
    struct SwitchableBus {
        broken: Arc<Mutex<bool>>,
    }

    impl SensorBus for SwitchableBus {
        fn read_climate(&mut self) -> Result<ClimateSample> {
            if *self.broken.lock().unwrap() {
                return Err(NodeError::Hardware("dht".into()));
            }
            Ok(ClimateSample {
                temperature: 20.0,
                humidity: 50.0,
            })
        }

        fn read_light(&mut self) -> Result<u16> {
            if *self.broken.lock().unwrap() {
                return Err(NodeError::Hardware("adc".into()));
            }
            Ok(100)
        }

        fn read_distance_cm(&mut self) -> Result<f64> {
            if *self.broken.lock().unwrap() {
                return Err(NodeError::Hardware("echo".into()));
            }
            Ok(25.0)
        }
    }

    fn manager_with(sensors: SimulatedSensors) -> SensorManager {
        SensorManager::new(sensors, SimulatedLeds::new(&PinMap::default()), 100.0)
    }

    #[test]
    fn test_bin_fill_percent() {
        assert_eq!(bin_fill_percent(40.0, 100.0), Some(60.0));
        assert_eq!(bin_fill_percent(0.0, 100.0), Some(100.0));
        assert_eq!(bin_fill_percent(100.0, 100.0), Some(0.0));
        assert_eq!(bin_fill_percent(33.333, 100.0), Some(66.67));
        assert_eq!(bin_fill_percent(120.0, 100.0), None);
        assert_eq!(bin_fill_percent(-1.0, 100.0), None);
    }

    #[test]
    fn test_sample_all_channels() {
        let mut manager = manager_with(SimulatedSensors::steady(
            Some(ClimateSample {
                temperature: 21.5,
                humidity: 40.0,
            }),
            Some(700),
            Some(75.0),
        ));
        assert!(manager.last_reading().is_none());

        let reading = manager.sample().unwrap();
        assert_eq!(reading.temperature, Some(21.5));
        assert_eq!(reading.humidity, Some(40.0));
        assert_eq!(reading.light_level, Some(700));
        assert_eq!(reading.bin_level, Some(25.0));
        assert_eq!(manager.last_reading(), Some(&reading));
    }

    #[test]
    fn test_partial_failure_degrades_fields() {
        let mut manager = manager_with(SimulatedSensors::steady(None, Some(10), None));
        let reading = manager.sample().unwrap();
        assert_eq!(reading.temperature, None);
        assert_eq!(reading.humidity, None);
        assert_eq!(reading.light_level, Some(10));
        assert_eq!(reading.bin_level, None);
    }

    #[test]
    fn test_total_failure_keeps_previous_reading() {
        let bus = SwitchableBus::default();
        let broken = Arc::clone(&bus.broken);
        let mut manager = SensorManager::new(bus, SimulatedLeds::new(&PinMap::default()), 100.0);

        let first = manager.sample().unwrap();
        *broken.lock().unwrap() = true;

        assert!(matches!(manager.sample(), Err(NodeError::SampleFailed)));
        assert_eq!(manager.last_reading(), Some(&first));
    }

    #[test]
    fn test_total_failure_without_previous() {
        let mut manager = manager_with(SimulatedSensors::steady(None, None, None));
        assert!(manager.sample().is_err());
        assert!(manager.last_reading().is_none());
    }

    #[test]
    fn test_set_actuator_state_drives_leds() {
        let leds = SimulatedLeds::new(&PinMap::default());
        let levels = leds.levels();
        let mut manager = SensorManager::new(SimulatedSensors::steady(None, None, None), leds, 100.0);

        let state = ActuatorState {
            red_led: true,
            yellow_led: false,
            green_led: true,
        };
        assert_eq!(manager.set_actuator_state(state).unwrap(), state);
        assert_eq!(manager.actuator_state(), state);
        assert_eq!(*levels.lock(), [true, false, true]);
    }

    #[test]
    fn test_failed_write_leaves_state_and_rolls_back() {
        let leds = SimulatedLeds::new(&PinMap::default()).failing_on(Led::Green);
        let levels = leds.levels();
        let mut manager = SensorManager::new(SimulatedSensors::steady(None, None, None), leds, 100.0);

        let result = manager.set_actuator_state(ActuatorState {
            red_led: true,
            yellow_led: true,
            green_led: true,
        });
        assert!(matches!(result, Err(NodeError::Hardware(_))));
        assert_eq!(manager.actuator_state(), ActuatorState::default());
        assert_eq!(*levels.lock(), [false, false, false]);
    }

    #[test]
    fn test_toggle_red_keeps_other_leds() {
        let mut manager = manager_with(SimulatedSensors::steady(None, None, None));
        manager
            .set_actuator_state(ActuatorState {
                red_led: false,
                yellow_led: true,
                green_led: false,
            })
            .unwrap();

        let toggled = manager.toggle_red().unwrap();
        assert!(toggled.red_led);
        assert!(toggled.yellow_led);
        assert!(!toggled.green_led);
        assert!(!manager.toggle_red().unwrap().red_led);
    }

    #[test]
    fn test_reading_snapshot_carries_led_states() {
        let mut manager = manager_with(SimulatedSensors::steady(None, Some(1), None));
        manager.toggle_red().unwrap();
        let reading = manager.sample().unwrap();
        assert!(reading.led_states.red_led);

        let value = serde_json::to_value(&reading).unwrap();
        assert!(value["timestamp"].as_str().unwrap().len() == 19);
        assert!(value["temperature"].is_null());
        assert_eq!(value["ledStates"]["redLed"], true);
    }

    #[test]
    fn test_actuator_state_missing_fields_default_off() {
        let state: ActuatorState = serde_json::from_str(r#"{"redLed": true}"#).unwrap();
        assert_eq!(
            state,
            ActuatorState {
                red_led: true,
                yellow_led: false,
                green_led: false,
            }
        );
    }
}
