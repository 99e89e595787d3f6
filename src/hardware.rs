//! Hardware collaborator traits and host-side simulations
//!
//! The sensor node never talks to GPIO/ADC/one-wire peripherals directly.
//! Board support implements [`SensorBus`] and [`LedBank`]; the simulated
//! versions here let the node run (and be tested) on a development machine.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::{NodeError, Result};
use crate::settings::PinMap;

/// One temperature/humidity measurement from the DHT22
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
}

/// The three status LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Red,
    Yellow,
    Green,
}

impl Led {
    pub const ALL: [Led; 3] = [Led::Red, Led::Yellow, Led::Green];

    fn index(self) -> usize {
        match self {
            Led::Red => 0,
            Led::Yellow => 1,
            Led::Green => 2,
        }
    }
}

impl std::fmt::Display for Led {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Led::Red => f.write_str("red"),
            Led::Yellow => f.write_str("yellow"),
            Led::Green => f.write_str("green"),
        }
    }
}

/// Read-side hardware: every method is one physical measurement
pub trait SensorBus: Send {
    /// Trigger a DHT22 measurement
    fn read_climate(&mut self) -> Result<ClimateSample>;

    /// Raw light sensor ADC value
    fn read_light(&mut self) -> Result<u16>;

    /// Ultrasonic distance to the bin contents, in centimetres
    fn read_distance_cm(&mut self) -> Result<f64>;
}

/// Write-side hardware: drives one LED output
pub trait LedBank: Send {
    fn write(&mut self, led: Led, on: bool) -> Result<()>;
}

/// Simulated sensors with fixed or slowly drifting values.
///
/// A channel set to `None` fails every read, which is how tests model a
/// missing or broken sensor.
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    climate: Option<ClimateSample>,
    light: Option<u16>,
    distance_cm: Option<f64>,
    drift: bool,
    tick: u32,
}

impl SimulatedSensors {
    /// Nominal indoor readings that drift a little on every sample
    pub fn new(pins: &PinMap) -> Self {
        debug!(
            "[SIM] DHT22 on GPIO{}, light ADC on GPIO{}, HC-SR04 trig/echo on GPIO{}/{}",
            pins.dht, pins.light, pins.trigger, pins.echo
        );
        Self {
            climate: Some(ClimateSample {
                temperature: 22.5,
                humidity: 45.0,
            }),
            light: Some(512),
            distance_cm: Some(40.0),
            drift: true,
            tick: 0,
        }
    }

    /// Fixed readings; `None` channels always fail
    pub fn steady(
        climate: Option<ClimateSample>,
        light: Option<u16>,
        distance_cm: Option<f64>,
    ) -> Self {
        Self {
            climate,
            light,
            distance_cm,
            drift: false,
            tick: 0,
        }
    }

    fn wobble(&self, span: f64) -> f64 {
        if !self.drift {
            return 0.0;
        }
        // Triangle wave over 20 ticks in [-span, span]
        let phase = (self.tick % 20) as f64;
        let tri = if phase < 10.0 { phase } else { 20.0 - phase };
        (tri / 5.0 - 1.0) * span
    }
}

impl SensorBus for SimulatedSensors {
    fn read_climate(&mut self) -> Result<ClimateSample> {
        self.tick = self.tick.wrapping_add(1);
        let base = self
            .climate
            .ok_or_else(|| NodeError::Hardware("DHT22 measurement failed".into()))?;
        Ok(ClimateSample {
            temperature: base.temperature + self.wobble(0.5),
            humidity: base.humidity + self.wobble(2.0),
        })
    }

    fn read_light(&mut self) -> Result<u16> {
        let base = self
            .light
            .ok_or_else(|| NodeError::Hardware("light ADC read failed".into()))?;
        Ok((base as f64 + self.wobble(40.0)).clamp(0.0, 4095.0) as u16)
    }

    fn read_distance_cm(&mut self) -> Result<f64> {
        let base = self
            .distance_cm
            .ok_or_else(|| NodeError::Hardware("ultrasonic echo timeout".into()))?;
        Ok((base + self.wobble(3.0)).max(0.0))
    }
}

/// Simulated LED outputs backed by a shared level buffer
#[derive(Debug, Clone)]
pub struct SimulatedLeds {
    pins: [u8; 3],
    levels: Arc<Mutex<[bool; 3]>>,
    failing: Option<Led>,
}

impl SimulatedLeds {
    pub fn new(pins: &PinMap) -> Self {
        Self {
            pins: [pins.red, pins.yellow, pins.green],
            levels: Arc::new(Mutex::new([false; 3])),
            failing: None,
        }
    }

    /// Make every write to `led` fail
    pub fn failing_on(mut self, led: Led) -> Self {
        self.failing = Some(led);
        self
    }

    /// Shared handle to the physical output levels (red, yellow, green)
    pub fn levels(&self) -> Arc<Mutex<[bool; 3]>> {
        Arc::clone(&self.levels)
    }
}

impl LedBank for SimulatedLeds {
    fn write(&mut self, led: Led, on: bool) -> Result<()> {
        if self.failing == Some(led) {
            return Err(NodeError::Hardware(format!("{} LED write failed", led)));
        }
        let pin = self.pins[led.index()];
        self.levels.lock()[led.index()] = on;
        debug!("[SIM LED] GPIO{} ({}) -> {}", pin, led, on as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_sensors_fail_missing_channels() {
        let mut sensors = SimulatedSensors::steady(None, Some(300), None);
        assert!(sensors.read_climate().is_err());
        assert_eq!(sensors.read_light().unwrap(), 300);
        assert!(sensors.read_distance_cm().is_err());
    }

    #[test]
    fn test_drift_stays_in_range() {
        let mut sensors = SimulatedSensors::new(&PinMap::default());
        for _ in 0..50 {
            let climate = sensors.read_climate().unwrap();
            assert!((22.0..=23.0).contains(&climate.temperature));
            assert!(sensors.read_light().unwrap() <= 552);
        }
    }

    #[test]
    fn test_leds_write_levels() {
        let mut leds = SimulatedLeds::new(&PinMap::default());
        let levels = leds.levels();
        leds.write(Led::Yellow, true).unwrap();
        assert_eq!(*levels.lock(), [false, true, false]);
    }

    #[test]
    fn test_failing_led() {
        let mut leds = SimulatedLeds::new(&PinMap::default()).failing_on(Led::Green);
        assert!(leds.write(Led::Red, true).is_ok());
        assert!(matches!(
            leds.write(Led::Green, true),
            Err(NodeError::Hardware(_))
        ));
    }
}
