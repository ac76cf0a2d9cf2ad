//! Unboxing the three inbound event shapes.
//!
//! The platform hands every handler an opaque event. It is one of:
//! a gateway proxy request, an orchestrated message body from the
//! previous step of a sequence, or a bare invocation payload (which may
//! still smuggle a step list under `_sequence`).

use std::collections::HashMap;

use orchestrate_envelope::{
    gateway_metadata, is_proxy_request, parse_proxy_body, proxy_headers, OrchestratedMessageBody,
};
use serde_json::Value;
use tracing::warn;

use crate::error::SequenceError;
use crate::sequence::Sequence;
use crate::step::SequenceStep;

/// Result of unboxing an inbound event.
#[derive(Debug, Clone, Default)]
pub struct Unboxed {
    /// The request payload for the user function.
    pub request: Value,
    /// The sequence this invocation participates in (empty sentinel
    /// when none).
    pub sequence: Sequence,
    /// Header mapping carried with the invocation.
    pub headers: HashMap<String, String>,
    /// Originating gateway metadata (the proxy event minus body and
    /// headers), when the event came through the gateway.
    pub gateway: Option<Value>,
}

/// Recognize the event shape and unbox it.
pub fn unbox(event: &Value) -> Result<Unboxed, SequenceError> {
    if is_proxy_request(event) {
        return Ok(Unboxed {
            request: parse_proxy_body(event),
            sequence: Sequence::new(),
            headers: proxy_headers(event),
            gateway: Some(gateway_metadata(event)),
        });
    }

    if OrchestratedMessageBody::is_orchestrated(event) {
        let envelope = OrchestratedMessageBody::from_event(event)?;
        let sequence = Sequence::deserialize(&envelope.unpack_sequence()?)?;
        return Ok(Unboxed {
            request: envelope.unpack_body()?,
            sequence,
            headers: value_to_headers(&envelope.unpack_headers()?),
            gateway: None,
        });
    }

    // Bare event. A `_sequence` property is a step list to ingest; it is
    // stripped from the request either way.
    let mut request = event.clone();
    let mut sequence = Sequence::new();
    if let Value::Object(obj) = &mut request {
        if let Some(raw_steps) = obj.remove("_sequence") {
            let steps: Vec<SequenceStep> = serde_json::from_value(raw_steps)?;
            sequence.ingest_steps(&mut request, steps)?;
        }
    }

    Ok(Unboxed {
        request,
        sequence,
        headers: HashMap::new(),
        gateway: None,
    })
}

/// Unbox, degrading a malformed envelope to a bare request with an
/// empty sequence instead of failing the invocation.
pub fn unbox_or_bare(event: &Value) -> Unboxed {
    match unbox(event) {
        Ok(unboxed) => unboxed,
        Err(err) => {
            warn!(error = %err, "malformed envelope; continuing with bare request");
            Unboxed {
                request: event.clone(),
                ..Unboxed::default()
            }
        }
    }
}

/// Symmetric boxing: produce the orchestrated envelope for a body,
/// sequence, and header mapping.
pub fn box_message(
    body: &Value,
    sequence: &Sequence,
    headers: &HashMap<String, String>,
) -> Result<OrchestratedMessageBody, SequenceError> {
    let headers_value = serde_json::to_value(headers)?;
    Ok(OrchestratedMessageBody::pack(
        body,
        &sequence.serialize(),
        &headers_value,
    )?)
}

fn value_to_headers(value: &Value) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                headers.insert(k.clone(), s.to_string());
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_event_passes_through() {
        let unboxed = unbox(&json!({"n": 2})).unwrap();
        assert_eq!(unboxed.request, json!({"n": 2}));
        assert!(!unboxed.sequence.is_sequence());
        assert!(unboxed.gateway.is_none());
        assert!(unboxed.headers.is_empty());
    }

    #[test]
    fn test_bare_event_ingests_and_strips_sequence_property() {
        let event = json!({
            "n": 2,
            "_sequence": [
                {"arn": "fn-a", "params": {"seed": 1}},
                {"arn": "fn-b", "params": {}}
            ]
        });

        let unboxed = unbox(&event).unwrap();
        assert!(unboxed.request.get("_sequence").is_none());
        assert_eq!(unboxed.request["n"], 2);
        // Conductor params of the active step merged under the request.
        assert_eq!(unboxed.request["seed"], 1);
        assert!(unboxed.sequence.is_sequence());
        assert_eq!(unboxed.sequence.steps().len(), 2);
    }

    #[test]
    fn test_gateway_event_unboxes_to_proxy_parts() {
        let event = json!({
            "httpMethod": "POST",
            "headers": {"X-Correlation-Id": "c-1"},
            "body": "{\"n\":2}",
            "requestContext": {"requestId": "r-1"}
        });

        let unboxed = unbox(&event).unwrap();
        assert_eq!(unboxed.request, json!({"n": 2}));
        assert_eq!(unboxed.headers.get("X-Correlation-Id").map(String::as_str), Some("c-1"));
        assert!(!unboxed.sequence.is_sequence());

        let gateway = unboxed.gateway.unwrap();
        assert_eq!(gateway["requestContext"]["requestId"], "r-1");
        assert!(gateway.get("body").is_none());
    }

    #[test]
    fn test_orchestrated_round_trip() {
        let mut sequence = Sequence::new();
        sequence.add("fn-a", json!({})).add("fn-b", json!({}));
        sequence.next(json!({})).unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Correlation-Id".to_string(), "c-7".to_string());

        let envelope = box_message(&json!({"v": 1}), &sequence, &headers).unwrap();
        let event = serde_json::to_value(&envelope).unwrap();

        let unboxed = unbox(&event).unwrap();
        assert_eq!(unboxed.request, json!({"v": 1}));
        assert_eq!(unboxed.sequence, sequence);
        assert_eq!(unboxed.headers.get("X-Correlation-Id").map(String::as_str), Some("c-7"));
        assert!(unboxed.gateway.is_none());
    }

    #[test]
    fn test_exactly_one_shape_claims_the_event() {
        // gateway / orchestrated / bare are mutually exclusive outcomes.
        let gateway_event = json!({"httpMethod": "GET", "headers": {}, "requestContext": {}});
        let bare_event = json!({"n": 1});

        let g = unbox(&gateway_event).unwrap();
        assert!(g.gateway.is_some() && !g.sequence.is_sequence());

        let b = unbox(&bare_event).unwrap();
        assert!(b.gateway.is_none() && !b.sequence.is_sequence());

        let mut sequence = Sequence::new();
        sequence.add("fn-a", json!({})).add("fn-b", json!({}));
        sequence.next(json!({})).unwrap();
        let event =
            serde_json::to_value(box_message(&json!({}), &sequence, &HashMap::new()).unwrap())
                .unwrap();
        let o = unbox(&event).unwrap();
        assert!(o.gateway.is_none() && o.sequence.is_sequence());
    }

    #[test]
    fn test_malformed_envelope_degrades_to_bare() {
        let event = json!({
            "type": "orchestrated-message-body",
            "body": "gz:%%%",
            "sequence": "{}",
            "headers": "{}"
        });

        assert!(unbox(&event).is_err());

        let unboxed = unbox_or_bare(&event);
        assert_eq!(unboxed.request, event);
        assert!(!unboxed.sequence.is_sequence());
    }
}
