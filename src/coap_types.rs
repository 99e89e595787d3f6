//! CoAP message types for the sensor node
//!
//! Transport-agnostic request and response records. The UDP adapter in
//! [`crate::transport`] converts them to and from `coap-lite` packets, so the
//! handler logic never touches wire framing.

use std::net::SocketAddr;

/// CoAP Content-Format identifiers used by the node
/// See: https://www.iana.org/assignments/core-parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ContentFormat {
    /// text/plain; charset=utf-8
    TextPlain = 0,
    /// application/link-format (RFC 6690)
    LinkFormat = 40,
    /// application/cbor
    Cbor = 60,
}

impl ContentFormat {
    /// Convert from raw content-format ID
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::TextPlain),
            40 => Some(Self::LinkFormat),
            60 => Some(Self::Cbor),
            _ => None,
        }
    }

    /// Get the raw content-format ID
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// CoAP request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    /// RFC 8132
    Fetch,
    /// RFC 8132
    Patch,
    /// RFC 8132
    IPatch,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
            Method::Put => f.write_str("PUT"),
            Method::Delete => f.write_str("DELETE"),
            Method::Fetch => f.write_str("FETCH"),
            Method::Patch => f.write_str("PATCH"),
            Method::IPatch => f.write_str("iPATCH"),
        }
    }
}

/// CoAP response codes produced by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    // Success codes
    /// 2.04 Changed
    Changed,
    /// 2.05 Content
    Content,

    // Client error codes
    /// 4.00 Bad Request
    BadRequest,
    /// 4.04 Not Found
    NotFound,
    /// 4.05 Method Not Allowed
    MethodNotAllowed,

    // Server error codes
    /// 5.00 Internal Server Error
    InternalServerError,
    /// 5.03 Service Unavailable
    ServiceUnavailable,
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (class, detail) = self.to_code_pair();
        write!(f, "{}.{:02}", class, detail)
    }
}

impl ResponseCode {
    /// Convert to CoAP response code format (class.detail)
    pub fn to_code_pair(self) -> (u8, u8) {
        match self {
            Self::Changed => (2, 4),
            Self::Content => (2, 5),
            Self::BadRequest => (4, 0),
            Self::NotFound => (4, 4),
            Self::MethodNotAllowed => (4, 5),
            Self::InternalServerError => (5, 0),
            Self::ServiceUnavailable => (5, 3),
        }
    }

    /// Check if this is a success code
    pub fn is_success(self) -> bool {
        matches!(self, Self::Changed | Self::Content)
    }
}

/// CoAP message type of an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Piggybacked response to a confirmable request
    Acknowledgement,
    /// Response to a non-confirmable request, or an observe notification
    NonConfirmable,
}

/// An inbound CoAP request (transport-agnostic)
#[derive(Debug, Clone)]
pub struct Request {
    /// The request method
    pub method: Method,
    /// Uri-Path joined with '/', with a leading '/'
    pub path: String,
    /// Address and port of the caller
    pub source: SocketAddr,
    /// Message id of the request datagram
    pub message_id: u16,
    /// Whether the request was sent as CON
    pub confirmable: bool,
    /// Correlation token chosen by the caller
    pub token: Vec<u8>,
    /// CBOR-encoded payload
    pub payload: Vec<u8>,
    /// Content format of the payload
    pub content_format: Option<ContentFormat>,
    /// Accept option
    pub accept: Option<ContentFormat>,
    /// Observe option (0 = register, 1 = deregister)
    pub observe: Option<u32>,
}

impl Request {
    /// Create a new confirmable request with an empty token and payload
    pub fn new(method: Method, path: &str, source: SocketAddr) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            source,
            message_id: 0,
            confirmable: true,
            token: Vec::new(),
            payload: Vec::new(),
            content_format: None,
            accept: None,
            observe: None,
        }
    }

    /// Set the correlation token
    pub fn with_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the message id
    pub fn with_message_id(mut self, message_id: u16) -> Self {
        self.message_id = message_id;
        self
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Vec<u8>, format: ContentFormat) -> Self {
        self.payload = payload;
        self.content_format = Some(format);
        self
    }

    /// Set the Observe option
    pub fn with_observe(mut self, observe: u32) -> Self {
        self.observe = Some(observe);
        self
    }

    /// Set the Accept option
    pub fn with_accept(mut self, accept: ContentFormat) -> Self {
        self.accept = Some(accept);
        self
    }

    /// Mark the request as non-confirmable
    pub fn non_confirmable(mut self) -> Self {
        self.confirmable = false;
        self
    }
}

/// An outgoing CoAP response or notification (transport-agnostic)
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Where the message goes
    pub destination: SocketAddr,
    /// Message id (request's id for piggybacked responses)
    pub message_id: u16,
    /// CON/NON/ACK type
    pub kind: MessageKind,
    /// Response code
    pub code: ResponseCode,
    /// Content format of the payload
    pub content_format: Option<ContentFormat>,
    /// Token echoed from the request or the observer registration
    pub token: Vec<u8>,
    /// Observe sequence number, if any
    pub observe: Option<u32>,
    /// Encoded payload
    pub payload: Vec<u8>,
}

impl Response {
    /// Create a response addressed back to the caller of `request`
    pub fn reply(request: &Request, code: ResponseCode, payload: Vec<u8>) -> Self {
        let kind = if request.confirmable {
            MessageKind::Acknowledgement
        } else {
            MessageKind::NonConfirmable
        };
        Self {
            destination: request.source,
            message_id: request.message_id,
            kind,
            code,
            content_format: Some(ContentFormat::Cbor),
            token: request.token.clone(),
            observe: None,
            payload,
        }
    }

    /// Create a 2.05 Content response with a CBOR payload
    pub fn content(request: &Request, payload: Vec<u8>) -> Self {
        Self::reply(request, ResponseCode::Content, payload)
    }

    /// Create a 2.04 Changed response with a CBOR payload
    pub fn changed(request: &Request, payload: Vec<u8>) -> Self {
        Self::reply(request, ResponseCode::Changed, payload)
    }

    /// Create an error response carrying `{status: "error", message}`
    pub fn error(request: &Request, code: ResponseCode, message: &str) -> Self {
        Self::reply(request, code, crate::codec::error_payload(message))
    }

    /// Create a not found error
    pub fn not_found(request: &Request) -> Self {
        Self::error(
            request,
            ResponseCode::NotFound,
            &format!("Resource not found: {}", request.path),
        )
    }

    /// Create a method not allowed error
    pub fn method_not_allowed(request: &Request) -> Self {
        Self::error(
            request,
            ResponseCode::MethodNotAllowed,
            &format!("Method {} not allowed on {}", request.method, request.path),
        )
    }

    /// Create an unsolicited 2.05 notification for an observer
    pub fn notification(
        destination: SocketAddr,
        token: Vec<u8>,
        message_id: u16,
        sequence: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            destination,
            message_id,
            kind: MessageKind::NonConfirmable,
            code: ResponseCode::Content,
            content_format: Some(ContentFormat::Cbor),
            token,
            observe: Some(sequence),
            payload,
        }
    }

    /// Override the content format
    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format);
        self
    }

    /// Attach an Observe option
    pub fn with_observe(mut self, sequence: u32) -> Self {
        self.observe = Some(sequence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SocketAddr {
        "192.168.4.10:40000".parse().unwrap()
    }

    #[test]
    fn test_content_format_conversion() {
        assert_eq!(ContentFormat::from_u16(60), Some(ContentFormat::Cbor));
        assert_eq!(ContentFormat::LinkFormat.as_u16(), 40);
        assert_eq!(ContentFormat::from_u16(112), None);
    }

    #[test]
    fn test_response_code() {
        assert_eq!(ResponseCode::Content.to_code_pair(), (2, 5));
        assert_eq!(ResponseCode::InternalServerError.to_string(), "5.00");
        assert!(ResponseCode::Changed.is_success());
        assert!(!ResponseCode::NotFound.is_success());
    }

    #[test]
    fn test_request_path_normalized() {
        let request = Request::new(Method::Get, "leds", source());
        assert_eq!(request.path, "/leds");
        let request = Request::new(Method::Get, "/.well-known/core", source());
        assert_eq!(request.path, "/.well-known/core");
    }

    #[test]
    fn test_reply_echoes_token_and_message_id() {
        let request = Request::new(Method::Get, "/config", source())
            .with_token(vec![0xAB, 0xCD])
            .with_message_id(77);
        let response = Response::content(&request, vec![0xA0]);

        assert_eq!(response.destination, source());
        assert_eq!(response.token, vec![0xAB, 0xCD]);
        assert_eq!(response.message_id, 77);
        assert_eq!(response.kind, MessageKind::Acknowledgement);

        let non = Response::content(&request.clone().non_confirmable(), vec![]);
        assert_eq!(non.kind, MessageKind::NonConfirmable);
    }
}
