//! sensor-coreconf - CoAP resource server for an environmental sensor node
//!
//! The node samples a climate sensor, a light sensor and an ultrasonic bin
//! level sensor, drives three status LEDs, and exposes all of it as CoAP
//! resources with CBOR payloads. Clients can observe `/leds` (RFC 7641) and
//! tune the sampling interval through `/config`.
//!
//! # Example
//!
//! ```no_run
//! use sensor_coreconf::hardware::{SimulatedLeds, SimulatedSensors};
//! use sensor_coreconf::{Node, NodeSettings, SensorManager};
//!
//! # async fn serve() -> sensor_coreconf::Result<()> {
//! let settings = NodeSettings::load("node.json")?;
//! let sensors = SensorManager::new(
//!     SimulatedSensors::new(&settings.pins),
//!     SimulatedLeds::new(&settings.pins),
//!     settings.max_bin_height_cm,
//! );
//! let socket = tokio::net::UdpSocket::bind(settings.bind).await?;
//!
//! let node = Node::new(settings, sensors);
//! node.run(socket, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

pub mod coap_types;
pub mod codec;
pub mod config;
mod coreconf;
mod error;
pub mod handler;
pub mod hardware;
pub mod node;
pub mod observe;
pub mod request_builder;
pub mod sampling;
pub mod sensors;
pub mod settings;
pub mod transport;

pub use config::{ConfigManager, RuntimeConfig};
pub use coreconf::{CATALOG, ResourceDescriptor, ResourceKind, ResourceModel};
pub use error::{NodeError, Result};
pub use handler::ResourceServer;
pub use node::{ButtonHandle, DeviceEvent, Node};
pub use request_builder::{ClientResponse, RequestBuilder};
pub use sampling::SamplingLoop;
pub use sensors::{ActuatorState, SensorManager, SensorReading};
pub use settings::{NodeSettings, PinMap};
