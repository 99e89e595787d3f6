//! CoAP resource server
//!
//! Maps each inbound request to one resource handler through the catalog in
//! [`crate::coreconf`], keeps the observer registry, and turns LED state
//! transitions into observe notifications.
//!
//! The server owns no device state. Each call borrows the
//! [`SensorManager`] and [`ConfigManager`] it needs, so every write still
//! goes through the owning component.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec;
use crate::coap_types::{ContentFormat, Method, Request, Response, ResponseCode};
use crate::config::{ConfigManager, RuntimeConfig};
use crate::coreconf::{ResourceKind, ResourceModel};
use crate::observe::ObserverRegistry;
use crate::sensors::{ActuatorState, SensorManager};
use crate::transport::MessageSink;

/// Observe option value that registers an observer
pub const OBSERVE_REGISTER: u32 = 0;
/// Observe option value that cancels an observation
pub const OBSERVE_DEREGISTER: u32 = 1;

#[derive(Debug, Serialize)]
struct ConfigUpdated {
    status: &'static str,
    config: RuntimeConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LedsUpdated {
    status: &'static str,
    led_states: ActuatorState,
}

/// Main CoAP resource server
///
/// # Example
/// ```ignore
/// let mut server = ResourceServer::new(ResourceModel::new(), sensors.actuator_state(), 1);
/// let response = server.handle(&request, &mut sensors, &mut config);
/// // Send response via your CoAP transport
/// ```
#[derive(Debug)]
pub struct ResourceServer {
    model: ResourceModel,
    observers: ObserverRegistry,
    /// LED state the observers last heard about
    last_notified: ActuatorState,
    next_message_id: u16,
}

impl ResourceServer {
    /// Create a server; `initial` is the LED state observers start from
    pub fn new(model: ResourceModel, initial: ActuatorState, message_id_seed: u16) -> Self {
        Self {
            model,
            observers: ObserverRegistry::new(),
            last_notified: initial,
            next_message_id: message_id_seed,
        }
    }

    pub fn model(&self) -> &ResourceModel {
        &self.model
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Handle an incoming request and build its response
    pub fn handle(
        &mut self,
        request: &Request,
        sensors: &mut SensorManager,
        config: &mut ConfigManager,
    ) -> Response {
        let Some(resource) = ResourceKind::from_path(&request.path) else {
            debug!("{} {} from {}: not found", request.method, request.path, request.source);
            return Response::not_found(request);
        };
        if !resource.allows(request.method) {
            debug!("{} {} from {}: method not allowed", request.method, request.path, request.source);
            return Response::method_not_allowed(request);
        }
        debug!("{} {} from {}", request.method, resource.path(), request.source);

        match (resource, request.method) {
            (ResourceKind::Discovery, Method::Get) => self.get_discovery(request),
            (ResourceKind::Capabilities, Method::Get) => {
                Response::content(request, self.model.capabilities_descriptor())
            }
            (ResourceKind::Sensors, Method::Get) => self.get_sensors(request, sensors),
            (ResourceKind::Config, Method::Get) => {
                Response::content(request, codec::encode_or_fallback(&config.get()))
            }
            (ResourceKind::Config, Method::Put) => self.put_config(request, config),
            (ResourceKind::Leds, Method::Get) => self.get_leds(request, sensors),
            (ResourceKind::Leds, Method::Put) => self.put_leds(request, sensors),
            _ => Response::method_not_allowed(request),
        }
    }

    /// Handle a Reset from `source`: drop the observer it rejects, if any
    pub fn handle_reset(&mut self, source: std::net::SocketAddr, message_id: u16) -> bool {
        match self.observers.deregister_by_message_id(source, message_id) {
            Some((resource, _)) => {
                info!("Observer {} rejected a notification; removed from {}", source, resource.path());
                true
            }
            None => false,
        }
    }

    fn get_discovery(&self, request: &Request) -> Response {
        if request.accept == Some(ContentFormat::LinkFormat) {
            return Response::content(request, self.model.link_format().into_bytes())
                .with_content_format(ContentFormat::LinkFormat);
        }
        Response::content(request, self.model.discovery_descriptor())
    }

    fn get_sensors(&self, request: &Request, sensors: &SensorManager) -> Response {
        match sensors.last_reading() {
            Some(reading) => Response::content(request, codec::encode_or_fallback(reading)),
            None => Response::error(
                request,
                ResponseCode::ServiceUnavailable,
                "no sensor sample available yet",
            ),
        }
    }

    fn put_config(&self, request: &Request, config: &mut ConfigManager) -> Response {
        let patch: Map<String, Value> = match codec::decode(&request.payload) {
            Ok(patch) => patch,
            Err(e) => {
                warn!("Error updating config: {}", e);
                return Response::error(request, ResponseCode::InternalServerError, &e.to_string());
            }
        };
        let updated = config.update(&patch);
        info!("Config updated by {}: {:?}", request.source, updated);
        Response::changed(
            request,
            codec::encode_or_fallback(&ConfigUpdated {
                status: "updated",
                config: updated,
            }),
        )
    }

    fn get_leds(&mut self, request: &Request, sensors: &SensorManager) -> Response {
        let resource = ResourceKind::Leds;
        let mut observing = false;

        match request.observe {
            Some(OBSERVE_REGISTER) => {
                if self.observers.register(resource, request.source, &request.token) {
                    info!("Registering observer for {} from {}", resource.path(), request.source);
                }
                observing = true;
            }
            Some(OBSERVE_DEREGISTER) => {
                if self.observers.deregister(resource, request.source, &request.token) {
                    info!("Observer {} cancelled {}", request.source, resource.path());
                }
            }
            _ => {}
        }

        let response = Response::content(request, codec::encode_or_fallback(&sensors.actuator_state()));
        if observing {
            response.with_observe(self.observers.sequence(resource))
        } else {
            response
        }
    }

    fn put_leds(&self, request: &Request, sensors: &mut SensorManager) -> Response {
        let new_state: ActuatorState = match codec::decode(&request.payload) {
            Ok(state) => state,
            Err(e) => {
                warn!("Error decoding LED states: {}", e);
                return Response::error(request, ResponseCode::InternalServerError, &e.to_string());
            }
        };
        match sensors.set_actuator_state(new_state) {
            Ok(applied) => Response::changed(
                request,
                codec::encode_or_fallback(&LedsUpdated {
                    status: "updated",
                    led_states: applied,
                }),
            ),
            Err(e) => {
                warn!("Error updating LED states: {}", e);
                Response::error(request, ResponseCode::InternalServerError, &e.to_string())
            }
        }
    }

    /// Compare the live LED state with what observers last heard and push
    /// one notification per observer if it changed.
    ///
    /// A failed send is logged and the remaining observers are still tried.
    /// Returns the number of notifications handed to the sink successfully.
    pub fn poll_actuator_change(
        &mut self,
        sensors: &SensorManager,
        sink: &mut dyn MessageSink,
    ) -> usize {
        let current = sensors.actuator_state();
        if current == self.last_notified {
            return 0;
        }

        let resource = ResourceKind::Leds;
        let payload = codec::encode_or_fallback(&current);
        let sequence = self.observers.next_sequence(resource);
        info!(
            "LED state changed to {:?}; notifying {} observer(s)",
            current,
            self.observers.len(resource)
        );

        let next_message_id = &mut self.next_message_id;
        let mut delivered = 0;
        for observer in self.observers.observers_mut(resource) {
            let message_id = *next_message_id;
            *next_message_id = next_message_id.wrapping_add(1);

            let notification = Response::notification(
                observer.endpoint,
                observer.token.clone(),
                message_id,
                sequence,
                payload.clone(),
            );
            match sink.send(&notification) {
                Ok(()) => {
                    observer.last_message_id = Some(message_id);
                    delivered += 1;
                    debug!("Notified observer at {} for {}", observer.endpoint, resource.path());
                }
                Err(e) => warn!("Error notifying observer {}: {}", observer.endpoint, e),
            }
        }

        self.last_notified = current;
        delivered
    }
}
