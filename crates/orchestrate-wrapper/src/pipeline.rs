//! The wrapper pipeline every handler executes on entry and exit.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use orchestrate_envelope::{
    call_depth, custom_claims, ensure_correlation_id, query_parameters, ApiGatewayResponse,
    CALL_DEPTH_HEADER,
};
use orchestrate_errors::{CallDepthExceeded, ErrorResponseBody, OrchestrateError};
use orchestrate_sequence::{
    box_message, expand_arn, function_name, unbox_or_bare, Sequence, StepErrorHandler,
};

use crate::cascade::{run_cascade, CascadeOutcome};
use crate::context::{HandlerContext, InvocationInfo, ResponseShape};
use crate::invoker::Invoker;
use crate::options::WrapperOptions;
use crate::secrets::SecretStore;
use crate::tracker::{SequenceStatus, SequenceTrackerRequest, StatusStore};

/// Ordered states of the pipeline. The current state is carried in a
/// local variable so failures can name where they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    Unboxing,
    Prep,
    RunningFn,
    FnComplete,
    InvokeNext,
    SequenceStarting,
    SequenceTrackerStarting,
    ReturningValues,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Initializing => "initializing",
            PipelineState::Unboxing => "unboxing",
            PipelineState::Prep => "prep",
            PipelineState::RunningFn => "running-fn",
            PipelineState::FnComplete => "fn-complete",
            PipelineState::InvokeNext => "invoke-next",
            PipelineState::SequenceStarting => "sequence-starting",
            PipelineState::SequenceTrackerStarting => "sequence-tracker-starting",
            PipelineState::ReturningValues => "returning-values",
        }
    }
}

/// The orchestration runtime wrapped around a user handler.
pub struct Wrapper {
    invoker: Arc<dyn Invoker>,
    secrets: Arc<dyn SecretStore>,
    status_store: Arc<dyn StatusStore>,
    options: WrapperOptions,
}

impl Wrapper {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        secrets: Arc<dyn SecretStore>,
        status_store: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            invoker,
            secrets,
            status_store,
            options: WrapperOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WrapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one invocation of the wrapped handler.
    ///
    /// Returns the handler's value (or a gateway response object for
    /// proxy events); surfacing errors become gateway error responses
    /// for proxy events and `Err` otherwise.
    pub async fn handle<F, Fut>(
        &self,
        event: Value,
        invocation: InvocationInfo,
        handler: F,
    ) -> Result<Value, OrchestrateError>
    where
        F: FnOnce(Value, HandlerContext) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<Value>>,
    {
        let mut state = PipelineState::Initializing;
        debug!(
            state = state.as_str(),
            function = %invocation.function_name,
            "handler invoked"
        );

        state = PipelineState::Unboxing;
        let mut unboxed = unbox_or_bare(&event);
        debug!(state = state.as_str(), "event unboxed");

        state = PipelineState::Prep;
        let correlation_id = ensure_correlation_id(&mut unboxed.headers);
        let claims = unboxed
            .gateway
            .as_ref()
            .map(custom_claims)
            .unwrap_or_default();
        let query = unboxed
            .gateway
            .as_ref()
            .map(query_parameters)
            .unwrap_or_default();
        let is_gateway = unboxed.gateway.is_some();
        let depth = call_depth(&unboxed.headers);

        let mut sequence = unboxed.sequence.clone();
        let ctx = HandlerContext::new(
            correlation_id.clone(),
            invocation.clone(),
            unboxed.sequence,
            unboxed.gateway,
            unboxed.headers,
            query,
            claims,
            Arc::clone(&self.invoker),
            Arc::clone(&self.secrets),
            Arc::clone(&self.status_store),
        );

        if let Some(limit) = self.options.call_depth_limit {
            if depth > limit {
                warn!(state = state.as_str(), depth, limit, "call depth limit exceeded");
                let mut exceeded: OrchestrateError = CallDepthExceeded::new(depth, limit).into();
                exceeded.set_identity(&correlation_id, &invocation.aws_request_id);
                self.notify_tracker_error(&sequence, &correlation_id, &exceeded).await;
                return surface_error(exceeded, is_gateway, &ctx.response_shape());
            }
        }

        state = PipelineState::RunningFn;
        let step_policy = active_step_policy(&mut sequence);
        let result = match handler(unboxed.request.clone(), ctx.clone()).await {
            Ok(value) => value,
            Err(thrown) => {
                warn!(state = state.as_str(), error = %thrown, "handler raised");
                match run_cascade(thrown, &ctx, step_policy.as_ref(), &self.options).await {
                    CascadeOutcome::Resolved(value) => value,
                    CascadeOutcome::Surface(surfaced) => {
                        self.notify_tracker_error(&sequence, &correlation_id, &surfaced).await;
                        return surface_error(surfaced, is_gateway, &ctx.response_shape());
                    }
                }
            }
        };

        state = PipelineState::FnComplete;
        debug!(state = state.as_str(), "user function returned");
        if sequence.is_sequence() && !sequence.is_done() {
            state = PipelineState::InvokeNext;
            debug!(state = state.as_str(), "continuing sequence");
            match sequence.next(result.clone()) {
                Ok(next) => {
                    let mut headers = ctx.headers.clone();
                    if function_name(&next.arn) == invocation.function_name {
                        headers.insert(CALL_DEPTH_HEADER.to_string(), (depth + 1).to_string());
                    }
                    self.dispatch(&next.arn, &next.request, &sequence, &headers).await;
                }
                Err(failed) => {
                    warn!(state = state.as_str(), error = %failed, "sequence handoff failed");
                    let outcome =
                        run_cascade(failed.into(), &ctx, step_policy.as_ref(), &self.options).await;
                    if let CascadeOutcome::Surface(surfaced) = outcome {
                        self.notify_tracker_error(&sequence, &correlation_id, &surfaced).await;
                        return surface_error(surfaced, is_gateway, &ctx.response_shape());
                    }
                }
            }
        } else if sequence.is_sequence() {
            // Final step of the chain: settle it so progress reads complete.
            sequence.finish_step(result.clone());
        }

        if let Some(mut registered) = ctx.take_registered_sequence() {
            state = PipelineState::SequenceStarting;
            debug!(state = state.as_str(), "starting registered sequence");
            match registered.next(json!({})) {
                Ok(first) => {
                    let mut body = first.request;
                    if let (Value::Object(map), Value::Object(seed)) = (&mut body, &result) {
                        // The handler's return value seeds the new chain.
                        for (key, value) in seed {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                    self.dispatch(&first.arn, &body, &registered, &ctx.headers).await;
                }
                Err(failed) => {
                    warn!(state = state.as_str(), error = %failed, "registered sequence could not start")
                }
            }
        }

        if self.options.sequence_tracker.is_some() && sequence.is_sequence() {
            state = PipelineState::SequenceTrackerStarting;
            debug!(state = state.as_str(), "notifying sequence tracker");
            let settled = sequence.steps().iter().all(|s| s.status.is_settled());
            let status = if settled {
                SequenceStatus::success(&sequence, &correlation_id, result.clone())
            } else {
                SequenceStatus::running(&sequence, &correlation_id)
            };
            self.notify_tracker(status).await;
        }

        state = PipelineState::ReturningValues;
        debug!(state = state.as_str(), "pipeline complete");
        if is_gateway {
            Ok(marshal_gateway(result, &ctx.response_shape()))
        } else {
            Ok(result)
        }
    }

    /// Box and dispatch a continuation. Failures are logged and
    /// swallowed so the primary handler's return value still reaches
    /// the caller.
    async fn dispatch(
        &self,
        target: &str,
        body: &Value,
        sequence: &Sequence,
        headers: &HashMap<String, String>,
    ) {
        let attempt = async {
            let arn = expand_arn(target)?;
            let envelope = box_message(body, sequence, headers)?;
            self.invoker.invoke(&arn, &serde_json::to_value(&envelope)?).await?;
            Ok::<String, anyhow::Error>(arn)
        };
        match attempt.await {
            Ok(arn) => info!(arn = %arn, "continuation dispatched"),
            Err(failed) => error!(error = %failed, "continuation invoke failed; swallowed"),
        }
    }

    async fn notify_tracker(&self, status: SequenceStatus) {
        let Some(tracker) = &self.options.sequence_tracker else {
            return;
        };
        let request = SequenceTrackerRequest {
            status,
            firebase_secret_location: None,
        };
        let attempt = async {
            let arn = expand_arn(tracker)?;
            self.invoker.invoke(&arn, &serde_json::to_value(&request)?).await?;
            Ok::<(), anyhow::Error>(())
        };
        if let Err(failed) = attempt.await {
            warn!(error = %failed, "tracker notification failed; swallowed");
        }
    }

    async fn notify_tracker_error(
        &self,
        sequence: &Sequence,
        correlation_id: &str,
        surfaced: &OrchestrateError,
    ) {
        if self.options.sequence_tracker.is_none() || !sequence.is_sequence() {
            return;
        }
        let body = serde_json::to_value(ErrorResponseBody::from(surfaced)).unwrap_or(Value::Null);
        self.notify_tracker(SequenceStatus::error(sequence, correlation_id, body))
            .await;
    }
}

/// Conductor sugar: advance a freshly built sequence onto its first
/// step and dispatch it, returning the platform invocation response.
pub async fn start(
    sequence: &mut Sequence,
    invoker: &dyn Invoker,
    headers: &HashMap<String, String>,
) -> anyhow::Result<Value> {
    let first = sequence.next(json!({}))?;
    let arn = expand_arn(&first.arn)?;
    let envelope = box_message(&first.request, sequence, headers)?;
    Ok(invoker.invoke(&arn, &serde_json::to_value(&envelope)?).await?)
}

fn active_step_policy(sequence: &mut Sequence) -> Option<StepErrorHandler> {
    sequence.active_fn().and_then(|step| step.on_error.clone())
}

/// Marshal a handler result as a gateway proxy response.
fn marshal_gateway(result: Value, shape: &ResponseShape) -> Value {
    let body = match &result {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    let status = shape
        .status_code
        .unwrap_or(if body.is_empty() { 204 } else { 200 });
    let content_type = shape
        .content_type
        .clone()
        .unwrap_or_else(|| "application/json".to_string());

    let response = ApiGatewayResponse::new(status, body)
        .with_content_type(content_type)
        .with_headers(&shape.headers);
    serde_json::to_value(response).unwrap_or(Value::Null)
}

/// Surface a typed error: gateway events get an error response object,
/// everything else propagates it to the platform.
fn surface_error(
    error: OrchestrateError,
    is_gateway: bool,
    shape: &ResponseShape,
) -> Result<Value, OrchestrateError> {
    if !is_gateway {
        return Err(error);
    }
    let body = serde_json::to_string(&ErrorResponseBody::from(&error)).unwrap_or_default();
    let response = ApiGatewayResponse::new(error.http_status(), body)
        .with_content_type("application/json")
        .with_headers(&shape.headers);
    Ok(serde_json::to_value(response).unwrap_or(Value::Null))
}
