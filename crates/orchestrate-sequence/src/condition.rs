//! Serializable conditional predicates.
//!
//! A condition attached to a step is evaluated against the responses
//! map when the step is promoted to active; `false` moves the step
//! straight to skipped. Conditions are a small expression tree so they
//! survive the wire without any form of code evaluation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dynamic::lookup;

/// Predicate over the responses map of a sequence.
///
/// Paths use the same `stepId.json.path` form as dynamic references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Condition {
    Always,
    Never,
    /// The path resolves to any value.
    Exists { path: String },
    /// The path resolves to a truthy value (non-null, non-false,
    /// non-zero, non-empty).
    Truthy { path: String },
    Eq { path: String, value: Value },
    Ne { path: String, value: Value },
    Gt { path: String, value: f64 },
    Lt { path: String, value: f64 },
    Not { cond: Box<Condition> },
    All { conds: Vec<Condition> },
    Any { conds: Vec<Condition> },
}

impl Condition {
    /// Evaluate against the responses recorded so far.
    pub fn evaluate(&self, responses: &Map<String, Value>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Exists { path } => lookup(responses, path).is_some(),
            Condition::Truthy { path } => {
                lookup(responses, path).map(|v| is_truthy(&v)).unwrap_or(false)
            }
            Condition::Eq { path, value } => {
                lookup(responses, path).map(|v| &v == value).unwrap_or(false)
            }
            Condition::Ne { path, value } => {
                lookup(responses, path).map(|v| &v != value).unwrap_or(false)
            }
            Condition::Gt { path, value } => {
                as_number(lookup(responses, path)).map(|n| n > *value).unwrap_or(false)
            }
            Condition::Lt { path, value } => {
                as_number(lookup(responses, path)).map(|n| n < *value).unwrap_or(false)
            }
            Condition::Not { cond } => !cond.evaluate(responses),
            Condition::All { conds } => conds.iter().all(|c| c.evaluate(responses)),
            Condition::Any { conds } => conds.iter().any(|c| c.evaluate(responses)),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn as_number(value: Option<Value>) -> Option<f64> {
    value.as_ref().and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn responses() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("check".to_string(), json!({"passed": true, "score": 42, "tags": []}));
        map
    }

    #[test]
    fn test_truthiness() {
        let map = responses();
        assert!(Condition::Truthy { path: "check.passed".into() }.evaluate(&map));
        assert!(Condition::Truthy { path: "check.score".into() }.evaluate(&map));
        // Empty array is falsy; missing paths are falsy.
        assert!(!Condition::Truthy { path: "check.tags".into() }.evaluate(&map));
        assert!(!Condition::Truthy { path: "check.missing".into() }.evaluate(&map));
    }

    #[test]
    fn test_comparisons() {
        let map = responses();
        assert!(Condition::Eq { path: "check.score".into(), value: json!(42) }.evaluate(&map));
        assert!(Condition::Ne { path: "check.score".into(), value: json!(41) }.evaluate(&map));
        assert!(Condition::Gt { path: "check.score".into(), value: 40.0 }.evaluate(&map));
        assert!(!Condition::Lt { path: "check.score".into(), value: 40.0 }.evaluate(&map));
        // A missing path fails every comparison, including Ne.
        assert!(!Condition::Ne { path: "check.missing".into(), value: json!(1) }.evaluate(&map));
    }

    #[test]
    fn test_combinators() {
        let map = responses();
        let passed = Condition::Truthy { path: "check.passed".into() };
        let missing = Condition::Exists { path: "check.missing".into() };

        assert!(Condition::All { conds: vec![passed.clone()] }.evaluate(&map));
        assert!(!Condition::All { conds: vec![passed.clone(), missing.clone()] }.evaluate(&map));
        assert!(Condition::Any { conds: vec![passed.clone(), missing.clone()] }.evaluate(&map));
        assert!(Condition::Not { cond: Box::new(missing) }.evaluate(&map));
    }

    #[test]
    fn test_wire_round_trip() {
        let cond = Condition::All {
            conds: vec![
                Condition::Truthy { path: "a.ok".into() },
                Condition::Gt { path: "a.count".into(), value: 2.0 },
            ],
        };

        let wire = serde_json::to_value(&cond).unwrap();
        assert_eq!(wire["op"], "all");
        let back: Condition = serde_json::from_value(wire).unwrap();
        assert_eq!(back, cond);
    }
}
