//! Node runtime
//!
//! One task owns every piece of device state and multiplexes the inbound
//! socket, the observer poll tick, the sampling deadline and device events
//! with `tokio::select!`. Interrupt-side code only gets a [`ButtonHandle`],
//! which enqueues an event and returns.

use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{ConfigManager, RuntimeConfig};
use crate::coreconf::ResourceModel;
use crate::error::Result;
use crate::handler::ResourceServer;
use crate::sampling::SamplingLoop;
use crate::sensors::SensorManager;
use crate::settings::NodeSettings;
use crate::transport::{self, Inbound, MessageSink, UdpSink};

/// Large enough for any request the node serves
const MAX_DATAGRAM: usize = 1500;

/// Events raised outside the runtime task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    ButtonPressed { at: Instant },
}

/// Cloneable handle for the button interrupt
#[derive(Debug, Clone)]
pub struct ButtonHandle {
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl ButtonHandle {
    /// Record a press; returns `false` once the node has stopped
    pub fn press(&self) -> bool {
        self.events
            .send(DeviceEvent::ButtonPressed { at: Instant::now() })
            .is_ok()
    }
}

/// Rejects presses closer than `window` to the last accepted one
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, at: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if at.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(at);
        true
    }
}

enum Wake {
    Shutdown,
    Datagram(std::io::Result<(usize, SocketAddr)>),
    Poll,
    Sample,
    Event(DeviceEvent),
}

/// The sensor node: sensors, configuration, CoAP server and sampling loop
#[derive(Debug)]
pub struct Node {
    settings: NodeSettings,
    sensors: SensorManager,
    config: ConfigManager,
    server: ResourceServer,
    sampling: SamplingLoop,
    debouncer: Debouncer,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
    events_rx: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl Node {
    pub fn new(settings: NodeSettings, sensors: SensorManager) -> Self {
        // A zero interval would resample on every loop turn
        let config = ConfigManager::new(RuntimeConfig {
            sampling_interval_seconds: settings.sampling_interval_seconds.max(1),
        });
        let server = ResourceServer::new(
            ResourceModel::new(),
            sensors.actuator_state(),
            message_id_seed(),
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            debouncer: Debouncer::new(settings.button_debounce()),
            settings,
            sensors,
            config,
            server,
            sampling: SamplingLoop::new(),
            events_tx,
            events_rx,
        }
    }

    /// Handle for the button interrupt
    pub fn button(&self) -> ButtonHandle {
        ButtonHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn sensors(&self) -> &SensorManager {
        &self.sensors
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn server(&self) -> &ResourceServer {
        &self.server
    }

    /// Parse and answer one datagram
    pub fn handle_datagram(&mut self, bytes: &[u8], source: SocketAddr, sink: &mut dyn MessageSink) {
        match transport::parse_datagram(bytes, source) {
            Ok(Inbound::Request(request)) => {
                let response = self
                    .server
                    .handle(&request, &mut self.sensors, &mut self.config);
                if let Err(e) = sink.send(&response) {
                    warn!("Failed to answer {}: {}", source, e);
                }
            }
            Ok(Inbound::Reset { source, message_id }) => {
                if !self.server.handle_reset(source, message_id) {
                    debug!("Reset {} from {} matches no observer", message_id, source);
                }
            }
            Ok(Inbound::Ignored) => {}
            Err(e) => warn!("Dropping datagram from {}: {}", source, e),
        }
    }

    /// Apply a device event through the same path as `PUT /leds`
    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::ButtonPressed { at } => {
                if !self.debouncer.accept(at) {
                    debug!("Button bounce ignored");
                    return;
                }
                match self.sensors.toggle_red() {
                    Ok(state) => info!("Button pressed, red LED {}", if state.red_led { "on" } else { "off" }),
                    Err(e) => warn!("Button toggle failed: {}", e),
                }
            }
        }
    }

    /// Serve on `socket` until `shutdown` completes
    pub async fn run<F>(mut self, socket: UdpSocket, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("CoAP server listening on {}", socket.local_addr()?);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        // interval() panics on a zero period
        let mut poll = time::interval(self.settings.poll_interval().max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_sample = time::Instant::now();
        tokio::pin!(shutdown);

        loop {
            let wake = tokio::select! {
                _ = &mut shutdown => Wake::Shutdown,
                received = socket.recv_from(&mut buf) => Wake::Datagram(received),
                _ = poll.tick() => Wake::Poll,
                _ = time::sleep_until(next_sample) => Wake::Sample,
                Some(event) = self.events_rx.recv() => Wake::Event(event),
            };

            match wake {
                Wake::Shutdown => {
                    info!("Shutting down after {} sampling cycles", self.sampling.cycles());
                    return Ok(());
                }
                Wake::Datagram(Ok((len, source))) => {
                    let mut sink = UdpSink::new(&socket);
                    self.handle_datagram(&buf[..len], source, &mut sink);
                    sink.flush().await;
                }
                Wake::Datagram(Err(e)) => warn!("Receive failed: {}", e),
                Wake::Poll => {
                    let mut sink = UdpSink::new(&socket);
                    self.server.poll_actuator_change(&self.sensors, &mut sink);
                    sink.flush().await;
                }
                Wake::Sample => {
                    let delay = self.sampling.run_cycle(&mut self.sensors, &self.config);
                    next_sample = time::Instant::now() + delay;
                }
                Wake::Event(event) => self.handle_event(event),
            }
        }
    }
}

fn message_id_seed() -> u16 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos() as u16)
        .unwrap_or(1)
}
