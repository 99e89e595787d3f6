//! CoAP/UDP adapter
//!
//! Converts between `coap-lite` packets and the transport-agnostic
//! [`Request`]/[`Response`] records, and provides the [`MessageSink`] send
//! capability the server uses for responses and notifications.

use std::net::SocketAddr;

use coap_lite::{
    CoapOption, CoapRequest, ContentFormat as CoapContentFormat, MessageClass, MessageType, Packet,
    RequestType, ResponseType,
};
use log::{debug, warn};
use tokio::net::UdpSocket;

use crate::coap_types::{ContentFormat, MessageKind, Method, Request, Response, ResponseCode};
use crate::error::{NodeError, Result};

/// Send capability for outgoing responses and notifications
pub trait MessageSink {
    fn send(&mut self, message: &Response) -> Result<()>;
}

/// Collects messages instead of sending them
impl MessageSink for Vec<Response> {
    fn send(&mut self, message: &Response) -> Result<()> {
        self.push(message.clone());
        Ok(())
    }
}

/// Queues encoded messages for a UDP socket.
///
/// [`MessageSink::send`] only encodes; [`UdpSink::flush`] waits for the
/// socket to become writable and sends everything queued, in order.
#[derive(Debug)]
pub struct UdpSink<'a> {
    socket: &'a UdpSocket,
    pending: Vec<(SocketAddr, Vec<u8>)>,
}

impl<'a> UdpSink<'a> {
    pub fn new(socket: &'a UdpSocket) -> Self {
        Self {
            socket,
            pending: Vec::new(),
        }
    }

    /// Number of datagrams waiting for [`UdpSink::flush`]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Send every queued datagram; returns how many went out
    pub async fn flush(&mut self) -> usize {
        let mut sent = 0;
        for (destination, bytes) in self.pending.drain(..) {
            match self.socket.send_to(&bytes, destination).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("Send to {} failed: {}", destination, e),
            }
        }
        sent
    }
}

impl MessageSink for UdpSink<'_> {
    fn send(&mut self, message: &Response) -> Result<()> {
        let bytes = encode_response(message)?;
        self.pending.push((message.destination, bytes));
        Ok(())
    }
}

/// What a received datagram turned out to be
#[derive(Debug, Clone)]
pub enum Inbound {
    Request(Request),
    /// RST from a peer, e.g. an observer rejecting a notification
    Reset { source: SocketAddr, message_id: u16 },
    /// Empty ACKs, responses and unknown methods
    Ignored,
}

/// Parse one datagram received from `source`
pub fn parse_datagram(bytes: &[u8], source: SocketAddr) -> Result<Inbound> {
    let packet = Packet::from_bytes(bytes).map_err(|e| NodeError::Transport(e.to_string()))?;

    let method = match packet.header.code {
        MessageClass::Empty if packet.header.get_type() == MessageType::Reset => {
            return Ok(Inbound::Reset {
                source,
                message_id: packet.header.message_id,
            });
        }
        MessageClass::Request(request_type) => match method_from_coap(request_type) {
            Some(method) => method,
            None => {
                debug!("Ignoring request with unknown method from {}", source);
                return Ok(Inbound::Ignored);
            }
        },
        _ => return Ok(Inbound::Ignored),
    };

    let confirmable = packet.header.get_type() == MessageType::Confirmable;
    let message_id = packet.header.message_id;
    let token = packet.get_token().to_vec();
    let content_format = packet.get_content_format().and_then(content_format_from_coap);
    let accept = packet
        .get_option(CoapOption::Accept)
        .and_then(|values| values.front())
        .and_then(|raw| decode_uint(raw))
        .and_then(|value| u16::try_from(value).ok())
        .and_then(ContentFormat::from_u16);
    let observe = packet.get_observe_value().and_then(|value| value.ok());

    let coap_request = CoapRequest::from_packet(packet, source);
    let path = coap_request.get_path();
    let payload = coap_request.message.payload;

    let mut request = Request::new(method, &path, source)
        .with_message_id(message_id)
        .with_token(token);
    request.confirmable = confirmable;
    request.payload = payload;
    request.content_format = content_format;
    request.accept = accept;
    request.observe = observe;

    Ok(Inbound::Request(request))
}

/// Encode a response or notification to wire bytes
pub fn encode_response(message: &Response) -> Result<Vec<u8>> {
    let mut packet = Packet::new();
    packet.header.set_type(match message.kind {
        MessageKind::Acknowledgement => MessageType::Acknowledgement,
        MessageKind::NonConfirmable => MessageType::NonConfirmable,
    });
    packet.header.message_id = message.message_id;
    packet.header.code = MessageClass::Response(response_type(message.code));
    packet.set_token(message.token.clone());

    if let Some(sequence) = message.observe {
        packet.set_observe_value(sequence);
    }
    if !message.payload.is_empty() {
        if let Some(format) = message.content_format {
            packet.set_content_format(content_format_to_coap(format));
        }
        packet.payload = message.payload.clone();
    }

    packet
        .to_bytes()
        .map_err(|e| NodeError::Transport(e.to_string()))
}

/// Big-endian option value; `None` past four bytes
fn decode_uint(raw: &[u8]) -> Option<u32> {
    if raw.len() > 4 {
        return None;
    }
    Some(raw.iter().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
}

pub(crate) fn method_from_coap(request_type: RequestType) -> Option<Method> {
    match request_type {
        RequestType::Get => Some(Method::Get),
        RequestType::Post => Some(Method::Post),
        RequestType::Put => Some(Method::Put),
        RequestType::Delete => Some(Method::Delete),
        RequestType::Fetch => Some(Method::Fetch),
        RequestType::Patch => Some(Method::Patch),
        RequestType::IPatch => Some(Method::IPatch),
        _ => None,
    }
}

pub(crate) fn method_to_coap(method: Method) -> RequestType {
    match method {
        Method::Get => RequestType::Get,
        Method::Post => RequestType::Post,
        Method::Put => RequestType::Put,
        Method::Delete => RequestType::Delete,
        Method::Fetch => RequestType::Fetch,
        Method::Patch => RequestType::Patch,
        Method::IPatch => RequestType::IPatch,
    }
}

pub(crate) fn response_type(code: ResponseCode) -> ResponseType {
    match code {
        ResponseCode::Changed => ResponseType::Changed,
        ResponseCode::Content => ResponseType::Content,
        ResponseCode::BadRequest => ResponseType::BadRequest,
        ResponseCode::NotFound => ResponseType::NotFound,
        ResponseCode::MethodNotAllowed => ResponseType::MethodNotAllowed,
        ResponseCode::InternalServerError => ResponseType::InternalServerError,
        ResponseCode::ServiceUnavailable => ResponseType::ServiceUnavailable,
    }
}

pub(crate) fn response_code(response_type: ResponseType) -> Option<ResponseCode> {
    match response_type {
        ResponseType::Changed => Some(ResponseCode::Changed),
        ResponseType::Content => Some(ResponseCode::Content),
        ResponseType::BadRequest => Some(ResponseCode::BadRequest),
        ResponseType::NotFound => Some(ResponseCode::NotFound),
        ResponseType::MethodNotAllowed => Some(ResponseCode::MethodNotAllowed),
        ResponseType::InternalServerError => Some(ResponseCode::InternalServerError),
        ResponseType::ServiceUnavailable => Some(ResponseCode::ServiceUnavailable),
        _ => None,
    }
}

pub(crate) fn content_format_from_coap(cf: CoapContentFormat) -> Option<ContentFormat> {
    match cf {
        CoapContentFormat::TextPlain => Some(ContentFormat::TextPlain),
        CoapContentFormat::ApplicationLinkFormat => Some(ContentFormat::LinkFormat),
        CoapContentFormat::ApplicationCBOR => Some(ContentFormat::Cbor),
        _ => None,
    }
}

pub(crate) fn content_format_to_coap(format: ContentFormat) -> CoapContentFormat {
    match format {
        ContentFormat::TextPlain => CoapContentFormat::TextPlain,
        ContentFormat::LinkFormat => CoapContentFormat::ApplicationLinkFormat,
        ContentFormat::Cbor => CoapContentFormat::ApplicationCBOR,
    }
}
