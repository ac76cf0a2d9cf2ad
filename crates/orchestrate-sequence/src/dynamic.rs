//! Dynamic parameter references.
//!
//! A step parameter whose value is `{ "lookup": "stepId.json.path" }`
//! (or, in the legacy form, a string beginning with `:`) is resolved at
//! activation time against the sequence's responses map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SequenceError;

/// Sentinel shape marking a dynamic parameter value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DynamicReference {
    /// `stepId.json.path` into the responses map.
    pub lookup: String,
}

impl DynamicReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self { lookup: path.into() }
    }

    /// The wire value to place in a step's params.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "lookup": self.lookup })
    }
}

/// Extract the lookup path when a parameter value is dynamic.
///
/// Recognizes the sentinel object form and the legacy `:path` string form.
pub fn dynamic_path(value: &Value) -> Option<&str> {
    match value {
        Value::Object(obj) if obj.len() == 1 => obj.get("lookup").and_then(Value::as_str),
        Value::String(s) => s.strip_prefix(':'),
        _ => None,
    }
}

/// Dotted-path lookup into the responses map.
///
/// The first path segment names the completed step; the rest walk into
/// its recorded response. Step ids match either the exact responses key
/// or the function-name tail of a full ARN key.
pub fn lookup(responses: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let step_id = segments.next()?;

    let mut current = find_response(responses, step_id)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn find_response<'a>(responses: &'a Map<String, Value>, step_id: &str) -> Option<&'a Value> {
    if let Some(value) = responses.get(step_id) {
        return Some(value);
    }
    // Full-ARN keys still resolve by their function-name tail.
    responses.iter().find_map(|(key, value)| {
        let tail = key.rsplit(':').next().unwrap_or(key);
        (tail == step_id || tail.starts_with(&format!("{step_id}-"))).then_some(value)
    })
}

/// Resolve every dynamic value in a parameter mapping.
///
/// A lookup miss fails with an error naming the parameter key and the
/// source path; non-dynamic values pass through unchanged.
pub fn resolve_params(
    params: &Map<String, Value>,
    responses: &Map<String, Value>,
) -> Result<Map<String, Value>, SequenceError> {
    let mut resolved = Map::new();
    for (key, value) in params {
        match dynamic_path(value) {
            Some(path) => {
                let found = lookup(responses, path).ok_or_else(|| {
                    SequenceError::DynamicResolution {
                        key: key.clone(),
                        path: path.to_string(),
                    }
                })?;
                resolved.insert(key.clone(), found);
            }
            None => {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(resolved)
}

/// Like [`resolve_params`] but drops unresolvable dynamic values
/// instead of failing. Used at ingest time, where the incoming request
/// shadows whatever the conductor set.
pub fn resolve_params_lenient(
    params: &Map<String, Value>,
    responses: &Map<String, Value>,
) -> Map<String, Value> {
    let mut resolved = Map::new();
    for (key, value) in params {
        match dynamic_path(value) {
            Some(path) => {
                if let Some(found) = lookup(responses, path) {
                    resolved.insert(key.clone(), found);
                }
            }
            None => {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }
    resolved
}
