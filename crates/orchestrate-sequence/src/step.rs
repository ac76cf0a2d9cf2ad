//! Step types for the sequence plan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Condition;

/// Role of the target function within the sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionType {
    #[default]
    Task,
    FanOut,
    FanIn,
    Other,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::Task => "task",
            FunctionType::FanOut => "fan-out",
            FunctionType::FanIn => "fan-in",
            FunctionType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task" => Some(FunctionType::Task),
            "fan-out" => Some(FunctionType::FanOut),
            "fan-in" => Some(FunctionType::FanIn),
            "other" => Some(FunctionType::Other),
            _ => None,
        }
    }
}

/// Progression status of a step.
///
/// Statuses only advance through this ordered set; a sequence never has
/// more than one active step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Assigned,
    Active,
    Completed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Assigned => "assigned",
            StepStatus::Active => "active",
            StepStatus::Completed => "completed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(StepStatus::Assigned),
            "active" => Some(StepStatus::Active),
            "completed" => Some(StepStatus::Completed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }

    /// Whether the step has left the pending part of the plan.
    pub fn is_settled(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

/// Error handling attached to a single step by the conductor.
///
/// Either a wire-serializable forwarding target, or the name of a
/// handler registered in-process with the wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepErrorHandler {
    Forward {
        arn: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
    Named { handler: String },
}

/// One planned invocation within a sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    /// Target function, full ARN or short name.
    pub arn: String,

    /// Parameter mapping; values may be dynamic references.
    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(rename = "type", default)]
    pub step_type: FunctionType,

    #[serde(default)]
    pub status: StepStatus,

    /// Conditional predicate evaluated at activation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    /// Error policy with the final say when this step's invocation fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_error: Option<StepErrorHandler>,
}

impl SequenceStep {
    pub fn new(arn: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            arn: arn.into(),
            params,
            step_type: FunctionType::default(),
            status: StepStatus::default(),
            condition: None,
            on_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [
            StepStatus::Assigned,
            StepStatus::Active,
            StepStatus::Completed,
            StepStatus::Skipped,
        ] {
            assert_eq!(StepStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_function_type_wire_form() {
        assert_eq!(serde_json::to_value(FunctionType::FanOut).unwrap(), json!("fan-out"));
        assert_eq!(FunctionType::from_str("fan-in"), Some(FunctionType::FanIn));
    }

    #[test]
    fn test_step_serializes_camel_case() {
        let mut params = Map::new();
        params.insert("a".to_string(), json!(1));
        let mut step = SequenceStep::new("fn-a", params);
        step.step_type = FunctionType::Task;

        let wire = serde_json::to_value(&step).unwrap();
        assert_eq!(wire["arn"], "fn-a");
        assert_eq!(wire["type"], "task");
        assert_eq!(wire["status"], "assigned");
        assert!(wire.get("condition").is_none());
    }

    #[test]
    fn test_error_handler_wire_forms() {
        let forward: StepErrorHandler =
            serde_json::from_value(json!({"arn": "reporter", "params": {}})).unwrap();
        assert!(matches!(forward, StepErrorHandler::Forward { .. }));

        let named: StepErrorHandler =
            serde_json::from_value(json!({"handler": "cleanup"})).unwrap();
        assert!(matches!(named, StepErrorHandler::Named { .. }));
    }
}
