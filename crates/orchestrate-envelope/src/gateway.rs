//! API Gateway proxy integration shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// CORS headers attached to every gateway response.
pub const CORS_ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");
pub const CORS_ALLOW_CREDENTIALS: (&str, &str) = ("Access-Control-Allow-Credentials", "true");

/// Check whether a raw event has the gateway proxy integration shape.
///
/// A proxy event carries a `headers` mapping plus the request-context /
/// method fields the integration always sets; a bare invocation that
/// merely happens to contain a `headers` key does not.
pub fn is_proxy_request(event: &Value) -> bool {
    let Some(obj) = event.as_object() else {
        return false;
    };
    obj.get("headers").map(Value::is_object).unwrap_or(false)
        && (obj.contains_key("requestContext") || obj.contains_key("httpMethod"))
}

/// Copy of the proxy headers as a plain string mapping.
pub fn proxy_headers(event: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(headers) = event.get("headers").and_then(Value::as_object) {
        for (k, v) in headers {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}

/// Query string parameters as a plain string mapping; empty when absent.
pub fn query_parameters(event: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(params) = event.get("queryStringParameters").and_then(Value::as_object) {
        for (k, v) in params {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}

/// JSON-parse the proxy body; an absent or empty body parses to `{}`.
pub fn parse_proxy_body(event: &Value) -> Value {
    match event.get("body").and_then(Value::as_str) {
        Some(body) if !body.is_empty() => {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        }
        _ => Value::Object(Map::new()),
    }
}

/// The gateway metadata: the proxy event minus `body` and `headers`.
pub fn gateway_metadata(event: &Value) -> Value {
    let mut meta = event.as_object().cloned().unwrap_or_default();
    meta.remove("body");
    meta.remove("headers");
    Value::Object(meta)
}

/// Custom claims decoded from `requestContext.authorizer.customClaims`.
///
/// The authorizer stores claims as a JSON-encoded string; a missing or
/// malformed value decodes to the empty mapping.
pub fn custom_claims(gateway: &Value) -> Map<String, Value> {
    gateway
        .pointer("/requestContext/authorizer/customClaims")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// Outbound gateway proxy response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiGatewayResponse {
    /// Build a response with the CORS headers every gateway reply carries.
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert(CORS_ALLOW_ORIGIN.0.to_string(), CORS_ALLOW_ORIGIN.1.to_string());
        headers.insert(
            CORS_ALLOW_CREDENTIALS.0.to_string(),
            CORS_ALLOW_CREDENTIALS.1.to_string(),
        );
        Self {
            status_code,
            headers,
            body: body.into(),
        }
    }

    /// Set the `Content-Type` header.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers
            .insert("Content-Type".to_string(), content_type.into());
        self
    }

    /// Merge additional headers into the response.
    pub fn with_headers(mut self, extra: &HashMap<String, String>) -> Self {
        for (k, v) in extra {
            self.headers.insert(k.clone(), v.clone());
        }
        self
    }
}
