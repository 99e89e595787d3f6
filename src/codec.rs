//! CBOR payload codec
//!
//! Thin wrapper over `ciborium`. Every payload the node sends, success or
//! error, goes through here so an encode failure can always fall back to a
//! minimal error body instead of leaving a request unanswered.

use log::error;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{NodeError, Result};

/// Pre-encoded `{"status": "error", "message": "encoding failed"}`
pub const ENCODING_FAILED_PAYLOAD: &[u8] =
    b"\xa2\x66status\x65error\x67message\x6fencoding failed";

/// Body of every error payload
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| NodeError::CborEncode(e.to_string()))?;
    Ok(bytes)
}

/// Decode CBOR bytes into a value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| NodeError::CborDecode(e.to_string()))
}

/// Encode a value, degrading to [`ENCODING_FAILED_PAYLOAD`] on failure
pub fn encode_or_fallback<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    match encode(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Payload encoding failed: {}", e);
            ENCODING_FAILED_PAYLOAD.to_vec()
        }
    }
}

/// Encode `{"status": "error", "message": message}`
pub fn error_payload(message: &str) -> Vec<u8> {
    encode_or_fallback(&ErrorBody {
        status: "error",
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::sensors::ActuatorState;
    use serde_json::{Value, json};

    #[test]
    fn test_fallback_payload_is_valid_cbor() {
        let value: Value = decode(ENCODING_FAILED_PAYLOAD).unwrap();
        assert_eq!(
            value,
            json!({"status": "error", "message": "encoding failed"})
        );
    }

    #[test]
    fn test_error_payload() {
        let value: Value = decode(&error_payload("bad body")).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "bad body");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(matches!(
            decode::<Value>(&[0xFF, 0x00]),
            Err(NodeError::CborDecode(_))
        ));
        assert!(decode::<Value>(&[]).is_err());
    }

    #[test]
    fn test_payload_shapes_survive_reencoding() {
        let shapes = [
            json!({"redLed": true, "yellowLed": false, "greenLed": false}),
            json!({"samplingIntervalSeconds": 5}),
            json!({"status": "updated", "config": {"samplingIntervalSeconds": 5}}),
            json!({"status": "updated", "ledStates": {"redLed": false, "yellowLed": true, "greenLed": false}}),
            json!({"status": "error", "message": "boom"}),
            json!({
                "timestamp": "2024-05-01 12:00:00",
                "temperature": 21.5,
                "humidity": null,
                "lightLevel": 512,
                "binLevel": 60.0,
                "ledStates": {"redLed": false, "yellowLed": false, "greenLed": true}
            }),
        ];

        for shape in shapes {
            let bytes = encode(&shape).unwrap();
            let decoded: Value = decode(&bytes).unwrap();
            let reencoded: Value = decode(&encode(&decoded).unwrap()).unwrap();
            assert_eq!(decoded, shape);
            assert_eq!(reencoded, decoded);
        }
    }

    #[test]
    fn test_typed_values_decode_back() {
        let state = ActuatorState {
            red_led: true,
            yellow_led: false,
            green_led: true,
        };
        let decoded: ActuatorState = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);

        let config = RuntimeConfig {
            sampling_interval_seconds: 30,
        };
        let decoded: RuntimeConfig = decode(&encode(&config).unwrap()).unwrap();
        assert_eq!(decoded, config);
    }
}
