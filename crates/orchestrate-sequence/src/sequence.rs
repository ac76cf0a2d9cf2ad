//! The mutable sequence plan and its progression state machine.

use std::collections::HashMap;

use orchestrate_envelope::OrchestratedMessageBody;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::condition::Condition;
use crate::dynamic::{resolve_params, resolve_params_lenient};
use crate::error::SequenceError;
use crate::step::{FunctionType, SequenceStep, StepErrorHandler, StepStatus};

/// An ordered plan of function invocations sharing correlation identity.
///
/// Built by a conductor, or reconstructed from an inbound orchestrated
/// envelope. Mutated only through [`add`](Sequence::add) /
/// [`on_condition`](Sequence::on_condition) / [`on_error`](Sequence::on_error)
/// while building, [`ingest_steps`](Sequence::ingest_steps) at unbox time,
/// and [`next`](Sequence::next) at handoff time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    steps: Vec<SequenceStep>,
    responses: Map<String, Value>,
}

/// Output of [`Sequence::next`]: the target function and the request
/// assembled for it.
#[derive(Debug, Clone, PartialEq)]
pub struct NextInvocation {
    pub arn: String,
    pub request: Value,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task step. Non-object params collapse to the empty mapping.
    pub fn add(&mut self, arn: impl Into<String>, params: Value) -> &mut Self {
        self.add_typed(arn, params, FunctionType::Task)
    }

    /// Append a step with an explicit function type.
    pub fn add_typed(
        &mut self,
        arn: impl Into<String>,
        params: Value,
        step_type: FunctionType,
    ) -> &mut Self {
        let mut step = SequenceStep::new(arn, as_params(params));
        step.step_type = step_type;
        self.steps.push(step);
        self
    }

    /// Append a conditional step; a false predicate at activation time
    /// moves it straight to skipped.
    pub fn on_condition(
        &mut self,
        condition: Condition,
        arn: impl Into<String>,
        params: Value,
    ) -> &mut Self {
        let mut step = SequenceStep::new(arn, as_params(params));
        step.condition = Some(condition);
        self.steps.push(step);
        self
    }

    /// Attach error handling to the most recently added step.
    pub fn on_error(&mut self, handler: StepErrorHandler) -> &mut Self {
        match self.steps.last_mut() {
            Some(step) => step.on_error = Some(handler),
            None => debug!("on_error called before any step was added; ignored"),
        }
        self
    }

    /// Whether this is a real sequence (at least one step).
    pub fn is_sequence(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Whether no assigned step remains.
    pub fn is_done(&self) -> bool {
        !self.steps.iter().any(|s| s.status == StepStatus::Assigned)
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Responses recorded for completed steps, keyed by step ARN.
    pub fn responses(&self) -> &Map<String, Value> {
        &self.responses
    }

    /// Steps still assigned.
    pub fn remaining(&self) -> Vec<&SequenceStep> {
        self.steps.iter().filter(|s| s.status == StepStatus::Assigned).collect()
    }

    /// Steps already completed.
    pub fn completed(&self) -> Vec<&SequenceStep> {
        self.steps.iter().filter(|s| s.status == StepStatus::Completed).collect()
    }

    /// Steps skipped by their condition.
    pub fn skipped(&self) -> Vec<&SequenceStep> {
        self.steps.iter().filter(|s| s.status == StepStatus::Skipped).collect()
    }

    /// The first assigned step, if any.
    pub fn next_fn(&self) -> Option<&SequenceStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Assigned)
    }

    /// The active step.
    ///
    /// When nothing is active but assigned steps remain, the first
    /// assigned step is promoted as a side effect (lazy advance).
    pub fn active_fn(&mut self) -> Option<&SequenceStep> {
        self.promote_next();
        self.steps.iter().find(|s| s.status == StepStatus::Active)
    }

    /// Finalize the active step: mark it completed and record its
    /// response under its ARN. The sole writer of the responses map.
    pub fn finish_step(&mut self, response: Value) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.status == StepStatus::Active) {
            step.status = StepStatus::Completed;
            self.responses.insert(step.arn.clone(), response);
        }
    }

    /// Advance the sequence: finalize the active step with the current
    /// function's response, promote the next runnable step, and resolve
    /// its parameters into the request for the next invocation. The
    /// resolved mapping is layered under the current response, which
    /// wins on key collision.
    pub fn next(&mut self, current_response: Value) -> Result<NextInvocation, SequenceError> {
        self.finish_step(current_response.clone());
        self.promote_next();

        let active = self
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Active)
            .ok_or(SequenceError::NoAssignedSteps)?;

        let mut request = resolve_params(&active.params, &self.responses)?;
        if let Value::Object(response) = current_response {
            for (key, value) in response {
                request.insert(key, value);
            }
        }
        Ok(NextInvocation {
            arn: active.arn.clone(),
            request: Value::Object(request),
        })
    }

    /// [`next`](Sequence::next), packaged as the wire envelope ready to
    /// invoke: `(target ARN, orchestrated message body)`.
    pub fn next_envelope(
        &mut self,
        current_response: Value,
        headers: &HashMap<String, String>,
    ) -> Result<(String, OrchestratedMessageBody), SequenceError> {
        let next = self.next(current_response)?;
        let headers_value = serde_json::to_value(headers)?;
        let envelope =
            OrchestratedMessageBody::pack(&next.request, &self.serialize(), &headers_value)?;
        Ok((next.arn, envelope))
    }

    /// Replace the step list on a freshly built sequence and merge the
    /// conductor-set params of the newly active step under the incoming
    /// request (the incoming request wins on key collision).
    pub fn ingest_steps(
        &mut self,
        current_request: &mut Value,
        steps: Vec<SequenceStep>,
    ) -> Result<(), SequenceError> {
        if !self.steps.is_empty() {
            return Err(SequenceError::StepsAlreadyIngested);
        }
        self.steps = steps;
        self.promote_next();

        if let Some(active) = self.steps.iter().find(|s| s.status == StepStatus::Active) {
            let defaults = resolve_params_lenient(&active.params, &self.responses);
            if let Value::Object(request) = current_request {
                for (key, value) in defaults {
                    request.entry(key).or_insert(value);
                }
            }
        }
        Ok(())
    }

    /// Wire form: `{ isSequence, steps, responses }`.
    pub fn serialize(&self) -> Value {
        json!({
            "isSequence": self.is_sequence(),
            "steps": self.steps,
            "responses": self.responses,
        })
    }

    /// Rebuild from the wire form. `null` deserializes to the empty
    /// sentinel sequence.
    pub fn deserialize(value: &Value) -> Result<Self, SequenceError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let obj = value.as_object().ok_or_else(|| {
            SequenceError::MalformedSequence("expected a serialized sequence object".to_string())
        })?;

        let steps = match obj.get("steps") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => Vec::new(),
        };
        let responses = obj
            .get("responses")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Self { steps, responses })
    }

    /// Promote the first runnable assigned step to active, skipping any
    /// whose condition evaluates false. No-op while a step is active.
    fn promote_next(&mut self) {
        if self.steps.iter().any(|s| s.status == StepStatus::Active) {
            return;
        }
        while let Some(idx) = self.steps.iter().position(|s| s.status == StepStatus::Assigned) {
            let runnable = self.steps[idx]
                .condition
                .as_ref()
                .map(|c| c.evaluate(&self.responses))
                .unwrap_or(true);

            if runnable {
                self.steps[idx].status = StepStatus::Active;
                return;
            }
            debug!(arn = %self.steps[idx].arn, "condition false, step skipped");
            self.steps[idx].status = StepStatus::Skipped;
        }
    }
}

fn as_params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicReference;

    fn statuses(seq: &Sequence) -> Vec<StepStatus> {
        seq.steps().iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_empty_sequence_is_sentinel() {
        let seq = Sequence::new();
        assert!(!seq.is_sequence());
        assert!(seq.is_done());
        assert!(seq.next_fn().is_none());
    }

    #[test]
    fn test_build_and_progress() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({"x": 1})).add("fn-b", json!({}));

        let first = seq.next(json!({})).unwrap();
        assert_eq!(first.arn, "fn-a");
        assert_eq!(first.request, json!({"x": 1}));
        assert_eq!(statuses(&seq), vec![StepStatus::Active, StepStatus::Assigned]);

        let second = seq.next(json!({"out": 9})).unwrap();
        assert_eq!(second.arn, "fn-b");
        assert_eq!(statuses(&seq), vec![StepStatus::Completed, StepStatus::Active]);
        assert_eq!(seq.responses()["fn-a"], json!({"out": 9}));
        assert!(seq.is_done());

        let err = seq.next(json!({})).unwrap_err();
        assert!(matches!(err, SequenceError::NoAssignedSteps));
    }

    #[test]
    fn test_at_most_one_active_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({})).add("fn-b", json!({})).add("fn-c", json!({}));
        seq.next(json!({})).unwrap();
        seq.next(json!({})).unwrap();

        let active = seq.steps().iter().filter(|s| s.status == StepStatus::Active).count();
        assert_eq!(active, 1);
    }

    #[test]
    fn test_dynamic_params_resolve_from_prior_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.add("fn-b", json!({"total": DynamicReference::new("fn-a.count").to_value()}));

        seq.next(json!({})).unwrap();
        // Resolved params layered under the current response.
        let next = seq.next(json!({"count": 5})).unwrap();
        assert_eq!(next.request, json!({"total": 5, "count": 5}));
    }

    #[test]
    fn test_current_response_wins_over_resolved_params() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.add("fn-b", json!({"count": DynamicReference::new("fn-a.stale").to_value()}));

        seq.next(json!({})).unwrap();
        let next = seq.next(json!({"count": 5, "stale": 1})).unwrap();
        assert_eq!(next.request, json!({"count": 5, "stale": 1}));
    }

    #[test]
    fn test_unresolved_dynamic_param_fails_the_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.add("fn-b", json!({"total": {"lookup": "fn-z.count"}}));

        seq.next(json!({})).unwrap();
        let err = seq.next(json!({})).unwrap_err();
        assert!(matches!(err, SequenceError::DynamicResolution { .. }));
    }

    #[test]
    fn test_false_condition_skips_to_next_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.on_condition(
            Condition::Truthy { path: "fn-a.retry".into() },
            "fn-retry",
            json!({}),
        );
        seq.add("fn-b", json!({}));

        seq.next(json!({})).unwrap();
        let next = seq.next(json!({"retry": false})).unwrap();

        assert_eq!(next.arn, "fn-b");
        assert_eq!(
            statuses(&seq),
            vec![StepStatus::Completed, StepStatus::Skipped, StepStatus::Active]
        );
    }

    #[test]
    fn test_true_condition_runs_the_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.on_condition(
            Condition::Truthy { path: "fn-a.retry".into() },
            "fn-retry",
            json!({}),
        );

        seq.next(json!({})).unwrap();
        let next = seq.next(json!({"retry": true})).unwrap();
        assert_eq!(next.arn, "fn-retry");
    }

    #[test]
    fn test_on_error_attaches_to_last_step() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));
        seq.add("fn-b", json!({}));
        seq.on_error(StepErrorHandler::Named { handler: "cleanup".into() });

        assert!(seq.steps()[0].on_error.is_none());
        assert_eq!(
            seq.steps()[1].on_error,
            Some(StepErrorHandler::Named { handler: "cleanup".into() })
        );
    }

    #[test]
    fn test_active_fn_lazy_advance() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));

        assert_eq!(statuses(&seq), vec![StepStatus::Assigned]);
        let active = seq.active_fn().unwrap();
        assert_eq!(active.arn, "fn-a");
        assert_eq!(statuses(&seq), vec![StepStatus::Active]);
    }

    #[test]
    fn test_serialize_round_trip_preserves_everything() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({"x": 1}));
        seq.on_condition(Condition::Always, "fn-b", json!({}));
        seq.on_error(StepErrorHandler::Forward {
            arn: "reporter".into(),
            params: Map::new(),
        });
        seq.next(json!({})).unwrap();
        seq.next(json!({"done": true})).unwrap();

        let wire = seq.serialize();
        assert_eq!(wire["isSequence"], json!(true));

        let back = Sequence::deserialize(&wire).unwrap();
        assert_eq!(back, seq);
        assert_eq!(back.is_done(), seq.is_done());
        assert_eq!(back.responses(), seq.responses());
    }

    #[test]
    fn test_deserialize_null_and_reject_garbage() {
        assert_eq!(Sequence::deserialize(&Value::Null).unwrap(), Sequence::new());
        assert!(Sequence::deserialize(&json!("nope")).is_err());
    }

    #[test]
    fn test_ingest_steps_merges_conductor_params_under_request() {
        let mut seq = Sequence::new();
        let steps = vec![
            SequenceStep::new("fn-a", as_params(json!({"seed": 1, "shared": "conductor"}))),
            SequenceStep::new("fn-b", Map::new()),
        ];

        let mut request = json!({"shared": "incoming", "extra": true});
        seq.ingest_steps(&mut request, steps).unwrap();

        // Incoming wins on collision; conductor statics fill the gaps.
        assert_eq!(request["shared"], "incoming");
        assert_eq!(request["seed"], 1);
        assert_eq!(request["extra"], true);
        assert_eq!(statuses(&seq)[0], StepStatus::Active);
    }

    #[test]
    fn test_ingest_steps_rejects_existing_plan() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({}));

        let mut request = json!({});
        let err = seq
            .ingest_steps(&mut request, vec![SequenceStep::new("fn-b", Map::new())])
            .unwrap_err();
        assert!(matches!(err, SequenceError::StepsAlreadyIngested));
    }

    #[test]
    fn test_next_envelope_round_trips_sequence() {
        let mut seq = Sequence::new();
        seq.add("fn-a", json!({})).add("fn-b", json!({}));
        seq.next(json!({})).unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Correlation-Id".to_string(), "c-1".to_string());

        let (arn, envelope) = seq.next_envelope(json!({"v": 2}), &headers).unwrap();
        assert_eq!(arn, "fn-b");

        let carried = Sequence::deserialize(&envelope.unpack_sequence().unwrap()).unwrap();
        assert_eq!(carried, seq);
        assert_eq!(carried.responses()["fn-a"], json!({"v": 2}));
        assert_eq!(
            envelope.unpack_headers().unwrap()["X-Correlation-Id"],
            json!("c-1")
        );
    }

    #[test]
    fn test_status_profile_stays_ordered() {
        // completed* active? (assigned|skipped)* in step order, always.
        let mut seq = Sequence::new();
        seq.add("a", json!({}));
        seq.on_condition(Condition::Never, "b", json!({}));
        seq.add("c", json!({}));
        seq.add("d", json!({}));

        seq.next(json!({})).unwrap();
        seq.next(json!({})).unwrap();

        let profile = statuses(&seq);
        assert_eq!(
            profile,
            vec![
                StepStatus::Completed,
                StepStatus::Skipped,
                StepStatus::Active,
                StepStatus::Assigned
            ]
        );
    }
}
