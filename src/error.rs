//! Error types for sensor-coreconf

use thiserror::Error;

/// Main error type for sensor node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// A single hardware channel failed to read or write
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Every sensor channel failed during one sampling cycle
    #[error("Sample failed: all sensor reads failed")]
    SampleFailed,

    /// IO error (socket and file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error (settings files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR decoding error (maps to CoAP 5.00 on PUT)
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// CBOR encoding error
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// Node settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// CoAP framing error from the wire engine
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for sensor node operations
pub type Result<T> = std::result::Result<T, NodeError>;
