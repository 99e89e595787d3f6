//! Client-side request building utilities
//!
//! Helpers for constructing CoAP requests against the node and parsing its
//! responses and notifications.

use coap_lite::{CoapOption, MessageClass, MessageType, Packet};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec;
use crate::coap_types::{ContentFormat, Method, ResponseCode};
use crate::error::{NodeError, Result};
use crate::handler::{OBSERVE_DEREGISTER, OBSERVE_REGISTER};
use crate::sensors::ActuatorState;
use crate::transport;

/// Client-side request builder for the node's resources
#[derive(Debug)]
pub struct RequestBuilder {
    next_message_id: u16,
    confirmable: bool,
}

impl RequestBuilder {
    /// Create a builder whose first request uses `first_message_id`
    pub fn new(first_message_id: u16) -> Self {
        Self {
            next_message_id: first_message_id,
            confirmable: true,
        }
    }

    /// Send NON requests instead of CON
    pub fn non_confirmable(mut self) -> Self {
        self.confirmable = false;
        self
    }

    /// Build a GET request
    pub fn get(&mut self, path: &str, token: &[u8]) -> Result<Vec<u8>> {
        self.build(Method::Get, path, token, |_| {})
    }

    /// Build a GET asking for `format` in the Accept option
    pub fn get_accepting(&mut self, path: &str, token: &[u8], format: ContentFormat) -> Result<Vec<u8>> {
        self.build(Method::Get, path, token, |packet| {
            packet.add_option(CoapOption::Accept, encode_uint(u32::from(format.as_u16())));
        })
    }

    /// Build a GET that registers an observation
    pub fn observe(&mut self, path: &str, token: &[u8]) -> Result<Vec<u8>> {
        self.build(Method::Get, path, token, |packet| {
            packet.set_observe_value(OBSERVE_REGISTER);
        })
    }

    /// Build a GET that cancels the observation made with `token`
    pub fn cancel_observe(&mut self, path: &str, token: &[u8]) -> Result<Vec<u8>> {
        self.build(Method::Get, path, token, |packet| {
            packet.set_observe_value(OBSERVE_DEREGISTER);
        })
    }

    /// Build a PUT `/leds` with the full LED state
    pub fn put_leds(&mut self, state: &ActuatorState, token: &[u8]) -> Result<Vec<u8>> {
        self.put_cbor("/leds", state, token)
    }

    /// Build a PUT `/config` with the given keys
    pub fn put_config(&mut self, changes: &Map<String, Value>, token: &[u8]) -> Result<Vec<u8>> {
        self.put_cbor("/config", changes, token)
    }

    /// Build a PUT with any CBOR body
    pub fn put_cbor<T: Serialize + ?Sized>(&mut self, path: &str, body: &T, token: &[u8]) -> Result<Vec<u8>> {
        let payload = codec::encode(body)?;
        self.build(Method::Put, path, token, |packet| {
            packet.set_content_format(transport::content_format_to_coap(ContentFormat::Cbor));
            packet.payload = payload;
        })
    }

    /// Build a Reset rejecting the message with `message_id`
    pub fn reset(message_id: u16) -> Result<Vec<u8>> {
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Reset);
        packet.header.code = MessageClass::Empty;
        packet.header.message_id = message_id;
        packet
            .to_bytes()
            .map_err(|e| NodeError::Transport(e.to_string()))
    }

    fn build(
        &mut self,
        method: Method,
        path: &str,
        token: &[u8],
        customize: impl FnOnce(&mut Packet),
    ) -> Result<Vec<u8>> {
        let mut packet = Packet::new();
        packet.header.set_type(if self.confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        });
        packet.header.code = MessageClass::Request(transport::method_to_coap(method));
        packet.header.message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        packet.set_token(token.to_vec());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
        customize(&mut packet);

        packet
            .to_bytes()
            .map_err(|e| NodeError::Transport(e.to_string()))
    }
}

/// A response or notification received from the node
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub message_id: u16,
    pub message_type: MessageType,
    /// `None` for response codes the node never sends
    pub code: Option<ResponseCode>,
    pub token: Vec<u8>,
    pub observe: Option<u32>,
    pub content_format: Option<ContentFormat>,
    pub payload: Vec<u8>,
}

impl ClientResponse {
    /// True for observe notifications and registration responses
    pub fn is_notification(&self) -> bool {
        self.observe.is_some()
    }

    /// Decode a CBOR payload as JSON
    pub fn json(&self) -> Result<Value> {
        codec::decode(&self.payload)
    }

    /// Render the payload for display according to its content format
    pub fn render(&self) -> String {
        match self.content_format {
            Some(ContentFormat::Cbor) => match self.json() {
                Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                Err(e) => format!("<undecodable CBOR: {}>", e),
            },
            _ => String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

/// Parse a datagram received from the node
pub fn parse_response(bytes: &[u8]) -> Result<ClientResponse> {
    let packet = Packet::from_bytes(bytes).map_err(|e| NodeError::Transport(e.to_string()))?;
    let code = match packet.header.code {
        MessageClass::Response(response_type) => transport::response_code(response_type),
        other => {
            return Err(NodeError::Transport(format!(
                "expected a response, got {:?}",
                other
            )));
        }
    };

    Ok(ClientResponse {
        message_id: packet.header.message_id,
        message_type: packet.header.get_type(),
        code,
        token: packet.get_token().to_vec(),
        observe: packet.get_observe_value().and_then(|value| value.ok()),
        content_format: packet
            .get_content_format()
            .and_then(transport::content_format_from_coap),
        payload: packet.payload,
    })
}

fn encode_uint(value: u32) -> Vec<u8> {
    value
        .to_be_bytes()
        .into_iter()
        .skip_while(|byte| *byte == 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap_types::Response;
    use crate::transport::{Inbound, encode_response, parse_datagram};
    use std::net::SocketAddr;

    fn node_addr() -> SocketAddr {
        "127.0.0.1:5683".parse().unwrap()
    }

    fn parsed(bytes: &[u8]) -> crate::coap_types::Request {
        match parse_datagram(bytes, node_addr()).unwrap() {
            Inbound::Request(request) => request,
            other => panic!("expected a request, got {:?}", other),
        }
    }

    #[test]
    fn test_message_ids_increment() {
        let mut builder = RequestBuilder::new(u16::MAX);
        let first = parsed(&builder.get("/sensors", &[1]).unwrap());
        let second = parsed(&builder.get("/sensors", &[1]).unwrap());
        assert_eq!(first.message_id, u16::MAX);
        assert_eq!(second.message_id, 0);
        assert!(first.confirmable);
    }

    #[test]
    fn test_observe_and_cancel() {
        let mut builder = RequestBuilder::new(1).non_confirmable();
        let register = parsed(&builder.observe("/leds", &[9]).unwrap());
        let cancel = parsed(&builder.cancel_observe("/leds", &[9]).unwrap());
        assert_eq!(register.observe, Some(OBSERVE_REGISTER));
        assert_eq!(cancel.observe, Some(OBSERVE_DEREGISTER));
        assert!(!register.confirmable);
        assert_eq!(register.path, "/leds");
    }

    #[test]
    fn test_get_accepting_link_format() {
        let mut builder = RequestBuilder::new(1);
        let bytes = builder
            .get_accepting("/.well-known/core", &[], ContentFormat::LinkFormat)
            .unwrap();
        let request = parsed(&bytes);
        assert_eq!(request.path, "/.well-known/core");
        assert_eq!(request.accept, Some(ContentFormat::LinkFormat));
    }

    #[test]
    fn test_put_leds_body() {
        let mut builder = RequestBuilder::new(1);
        let state = ActuatorState {
            red_led: true,
            yellow_led: false,
            green_led: true,
        };
        let request = parsed(&builder.put_leds(&state, &[2]).unwrap());
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.content_format, Some(ContentFormat::Cbor));
        let body: ActuatorState = codec::decode(&request.payload).unwrap();
        assert_eq!(body, state);
    }

    #[test]
    fn test_reset_is_parsed_as_reset() {
        let bytes = RequestBuilder::reset(77).unwrap();
        assert!(matches!(
            parse_datagram(&bytes, node_addr()).unwrap(),
            Inbound::Reset { message_id: 77, .. }
        ));
    }

    #[test]
    fn test_parse_notification() {
        let notification = Response::notification(
            node_addr(),
            vec![9],
            12,
            3,
            codec::encode(&ActuatorState::default()).unwrap(),
        );
        let response = parse_response(&encode_response(&notification).unwrap()).unwrap();

        assert!(response.is_notification());
        assert_eq!(response.observe, Some(3));
        assert_eq!(response.code, Some(ResponseCode::Content));
        assert_eq!(response.message_type, MessageType::NonConfirmable);
        assert_eq!(response.json().unwrap()["redLed"], false);
        assert!(response.render().contains("greenLed"));
    }

    #[test]
    fn test_parse_rejects_requests() {
        let mut builder = RequestBuilder::new(1);
        let bytes = builder.get("/sensors", &[]).unwrap();
        assert!(parse_response(&bytes).is_err());
    }

    #[test]
    fn test_encode_uint() {
        assert_eq!(encode_uint(0), Vec::<u8>::new());
        assert_eq!(encode_uint(40), vec![40]);
        assert_eq!(encode_uint(0x0100), vec![1, 0]);
    }
}
