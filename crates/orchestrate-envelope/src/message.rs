//! The orchestrated message body: the wire form carried between
//! function invocations in a sequence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compress::{compress, decompress};
use crate::error::EnvelopeError;

/// Type marker identifying an orchestrated message body.
pub const ORCHESTRATED_MESSAGE_TYPE: &str = "orchestrated-message-body";

/// Envelope carried between invocations of a sequence.
///
/// `body`, `sequence`, and `headers` are independently encoded with the
/// field codec in [`crate::compress`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratedMessageBody {
    /// Always [`ORCHESTRATED_MESSAGE_TYPE`].
    #[serde(rename = "type")]
    pub message_type: String,

    /// Encoded request body for the receiving function.
    pub body: String,

    /// Encoded serialized sequence (`{isSequence, steps, responses}`).
    pub sequence: String,

    /// Encoded header mapping.
    pub headers: String,
}

impl OrchestratedMessageBody {
    /// Pack the three payloads into an envelope.
    pub fn pack(body: &Value, sequence: &Value, headers: &Value) -> Result<Self, EnvelopeError> {
        Ok(Self {
            message_type: ORCHESTRATED_MESSAGE_TYPE.to_string(),
            body: compress(body)?,
            sequence: compress(sequence)?,
            headers: compress(headers)?,
        })
    }

    /// Check whether a raw event carries the orchestrated type marker.
    pub fn is_orchestrated(event: &Value) -> bool {
        event.get("type").and_then(Value::as_str) == Some(ORCHESTRATED_MESSAGE_TYPE)
    }

    /// Parse a raw event into an envelope.
    pub fn from_event(event: &Value) -> Result<Self, EnvelopeError> {
        if !Self::is_orchestrated(event) {
            return Err(EnvelopeError::NotOrchestrated);
        }
        Ok(serde_json::from_value(event.clone())?)
    }

    /// Decode the request body payload.
    pub fn unpack_body(&self) -> Result<Value, EnvelopeError> {
        decompress(&self.body)
    }

    /// Decode the serialized sequence payload.
    pub fn unpack_sequence(&self) -> Result<Value, EnvelopeError> {
        decompress(&self.sequence)
    }

    /// Decode the header mapping payload.
    pub fn unpack_headers(&self) -> Result<Value, EnvelopeError> {
        decompress(&self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pack_unpack_round_trip() {
        let body = json!({"n": 2});
        let sequence = json!({"isSequence": true, "steps": [], "responses": {}});
        let headers = json!({"X-Correlation-Id": "c-1"});

        let envelope = OrchestratedMessageBody::pack(&body, &sequence, &headers).unwrap();

        assert_eq!(envelope.message_type, ORCHESTRATED_MESSAGE_TYPE);
        assert_eq!(envelope.unpack_body().unwrap(), body);
        assert_eq!(envelope.unpack_sequence().unwrap(), sequence);
        assert_eq!(envelope.unpack_headers().unwrap(), headers);
    }

    #[test]
    fn test_recognizes_orchestrated_events() {
        let body = json!({});
        let envelope = OrchestratedMessageBody::pack(&body, &body, &body).unwrap();
        let event = serde_json::to_value(&envelope).unwrap();

        assert!(OrchestratedMessageBody::is_orchestrated(&event));
        assert!(!OrchestratedMessageBody::is_orchestrated(&json!({"n": 2})));
        assert!(!OrchestratedMessageBody::is_orchestrated(&json!({"type": "other"})));
    }

    #[test]
    fn test_from_event_rejects_other_shapes() {
        let err = OrchestratedMessageBody::from_event(&json!({"n": 2})).unwrap_err();
        assert!(matches!(err, EnvelopeError::NotOrchestrated));
    }

    #[test]
    fn test_wire_serialization_uses_type_field() {
        let body = json!({"x": 1});
        let envelope = OrchestratedMessageBody::pack(&body, &body, &body).unwrap();
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["type"], ORCHESTRATED_MESSAGE_TYPE);
        let back: OrchestratedMessageBody = serde_json::from_value(wire).unwrap();
        assert_eq!(back, envelope);
    }
}
