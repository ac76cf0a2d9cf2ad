//! The layered error-handling cascade.
//!
//! Entered on anything thrown from the user function onward. Order:
//! serverless passthrough, matcher expectations, default policy, then
//! the active step's own error policy with the final say. Failures
//! inside the cascade are themselves caught: typed errors re-emerge as
//! rethrows, untyped ones as error-within-error.

use serde_json::{json, Value};
use tracing::{info, warn};

use orchestrate_errors::{
    as_serverless, as_typed, DefaultPolicy, Disposition, ErrorWithinError, HandledError,
    OrchestrateError, RethrowError, UnhandledError,
};
use orchestrate_sequence::StepErrorHandler;

use crate::context::HandlerContext;
use crate::options::WrapperOptions;

/// What the cascade decided.
pub enum CascadeOutcome {
    /// The error was fully resolved; the pipeline continues with this
    /// value in place of the handler result.
    Resolved(Value),
    /// The error surfaces: as a gateway error response for proxy
    /// requests, thrown otherwise.
    Surface(OrchestrateError),
}

/// Run the cascade for an error thrown during or after the user function.
pub async fn run_cascade(
    error: anyhow::Error,
    ctx: &HandlerContext,
    step_policy: Option<&StepErrorHandler>,
    options: &WrapperOptions,
) -> CascadeOutcome {
    let mut outcome = match cascade_inner(&error, ctx, step_policy, options).await {
        Ok(outcome) => outcome,
        Err(inner) => {
            warn!(error = %inner, "error cascade itself failed");
            let surfaced = match as_typed(&inner) {
                Some(typed) => OrchestrateError::Rethrow(RethrowError::from_typed(typed)),
                None => OrchestrateError::WithinError(ErrorWithinError::new(&inner, &error)),
            };
            CascadeOutcome::Surface(surfaced)
        }
    };

    if let CascadeOutcome::Surface(surfacing) = &mut outcome {
        surfacing.set_identity(&ctx.correlation_id, &ctx.invocation.aws_request_id);
    }
    outcome
}

async fn cascade_inner(
    error: &anyhow::Error,
    ctx: &HandlerContext,
    step_policy: Option<&StepErrorHandler>,
    options: &WrapperOptions,
) -> anyhow::Result<CascadeOutcome> {
    // Caller-typed errors pass through enriched, never re-wrapped.
    if let Some(serverless) = as_serverless(error) {
        let mut enriched = serverless.clone();
        enriched.enrich(
            &ctx.invocation.function_name,
            &ctx.correlation_id,
            &ctx.invocation.aws_request_id,
        );
        let outcome = CascadeOutcome::Surface(enriched.into());
        return step_final_say(outcome, error, ctx, step_policy, options).await;
    }

    let matcher = ctx.matcher_snapshot();

    // Registered expectations, first match wins.
    if let Some(expectation) = matcher.find(error) {
        let outcome = match &expectation.disposition {
            None => CascadeOutcome::Surface(
                HandledError::new(expectation.http_status, error).into(),
            ),
            Some(Disposition::Callback(callback)) => {
                if callback(error) {
                    info!(error = %error, "matched error resolved by callback");
                    CascadeOutcome::Resolved(Value::Null)
                } else {
                    CascadeOutcome::Surface(
                        HandledError::new(expectation.http_status, error).into(),
                    )
                }
            }
            Some(Disposition::ForwardTo { arn }) => {
                ctx.invoke(arn, &error_payload(error, ctx)).await?;
                info!(arn = %arn, "matched error forwarded");
                CascadeOutcome::Resolved(Value::Null)
            }
        };
        return step_final_say(outcome, error, ctx, step_policy, options).await;
    }

    // Nothing matched: the default policy decides.
    let outcome = match matcher.default_policy() {
        DefaultPolicy::Default { http_status } => {
            CascadeOutcome::Surface(UnhandledError::new(*http_status, error).into())
        }
        DefaultPolicy::HandlerFn { handler, http_status } => {
            if handler(error) {
                info!(error = %error, "error resolved by default handler");
                CascadeOutcome::Resolved(Value::Null)
            } else {
                CascadeOutcome::Surface(UnhandledError::new(*http_status, error).into())
            }
        }
        DefaultPolicy::Forwarding { arn } => {
            ctx.invoke(arn, &error_payload(error, ctx)).await?;
            info!(arn = %arn, "unmatched error forwarded");
            CascadeOutcome::Resolved(Value::Null)
        }
        DefaultPolicy::DefaultError { error: substitute } => {
            let mut substitute = substitute.clone();
            carry_original(&mut substitute, error);
            CascadeOutcome::Surface(substitute)
        }
    };
    step_final_say(outcome, error, ctx, step_policy, options).await
}

/// The active step's conductor-level error policy gets the final say
/// over anything about to surface.
async fn step_final_say(
    outcome: CascadeOutcome,
    error: &anyhow::Error,
    ctx: &HandlerContext,
    step_policy: Option<&StepErrorHandler>,
    options: &WrapperOptions,
) -> anyhow::Result<CascadeOutcome> {
    let surfacing = match outcome {
        CascadeOutcome::Resolved(value) => return Ok(CascadeOutcome::Resolved(value)),
        CascadeOutcome::Surface(surfacing) => surfacing,
    };
    let Some(policy) = step_policy else {
        return Ok(CascadeOutcome::Surface(surfacing));
    };

    match policy {
        StepErrorHandler::Named { handler } => match options.error_handler(handler) {
            Some(callback) if callback(error) => {
                info!(handler = %handler, "error resolved by step handler");
                Ok(CascadeOutcome::Resolved(Value::Null))
            }
            Some(_) => Ok(CascadeOutcome::Surface(surfacing)),
            None => {
                warn!(handler = %handler, "step error handler is not registered");
                Ok(CascadeOutcome::Surface(surfacing))
            }
        },
        StepErrorHandler::Forward { arn, params } => {
            let mut payload = error_payload(error, ctx);
            if let Value::Object(body) = &mut payload {
                for (key, value) in params {
                    body.insert(key.clone(), value.clone());
                }
            }
            ctx.invoke(arn, &payload).await?;
            info!(arn = %arn, "error forwarded by step policy");
            Ok(CascadeOutcome::Resolved(Value::Null))
        }
    }
}

fn error_payload(error: &anyhow::Error, ctx: &HandlerContext) -> Value {
    json!({
        "error": error.to_string(),
        "correlationId": ctx.correlation_id,
        "requestId": ctx.invocation.aws_request_id,
        "functionName": ctx.invocation.function_name,
    })
}

/// Propagate the original failure's message and stack onto a
/// user-provided substitute error.
fn carry_original(substitute: &mut OrchestrateError, original: &anyhow::Error) {
    let message = original.to_string();
    let stack = Some(format!("{original:?}"));
    match substitute {
        OrchestrateError::Handled(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::Unhandled(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::Default(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::Rethrow(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::WithinError(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::Serverless(e) => {
            e.message = message;
            e.stack = stack;
        }
        OrchestrateError::CallDepth(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{InvokeError, Invoker, RecordingInvoker};
    use crate::secrets::MemorySecretStore;
    use crate::tracker::MemoryStatusStore;
    use async_trait::async_trait;
    use orchestrate_errors::{DefaultError, ErrorKind, ServerlessError};
    use orchestrate_sequence::Sequence;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context_with(invoker: Arc<dyn Invoker>) -> HandlerContext {
        HandlerContext::new(
            "c-123".to_string(),
            crate::context::InvocationInfo::new("myHandlerFunction", "1234"),
            Sequence::new(),
            None,
            HashMap::new(),
            HashMap::new(),
            serde_json::Map::new(),
            invoker,
            Arc::new(MemorySecretStore::new()),
            Arc::new(MemoryStatusStore::new()),
        )
    }

    struct FailingInvoker;

    #[async_trait]
    impl Invoker for FailingInvoker {
        async fn invoke(&self, arn: &str, _payload: &Value) -> Result<Value, InvokeError> {
            Err(InvokeError::Transport {
                arn: arn.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_serverless_error_passes_through_enriched() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        let error: anyhow::Error = ServerlessError::new(403, "nope", "auth").into();

        match run_cascade(error, &ctx, None, &WrapperOptions::new()).await {
            CascadeOutcome::Surface(OrchestrateError::Serverless(e)) => {
                assert_eq!(e.http_status, 403);
                assert_eq!(e.classification, "myHandlerFunction/auth");
                assert_eq!(e.correlation_id.as_deref(), Some("c-123"));
                assert_eq!(e.aws_request_id.as_deref(), Some("1234"));
            }
            _ => panic!("expected enriched serverless error"),
        }
    }

    #[tokio::test]
    async fn test_unmatched_error_becomes_unhandled() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));

        match run_cascade(anyhow::anyhow!("boom"), &ctx, None, &WrapperOptions::new()).await {
            CascadeOutcome::Surface(surfaced) => {
                assert_eq!(surfaced.kind(), ErrorKind::UnhandledError);
                assert_eq!(surfaced.http_status(), 500);
                assert_eq!(surfaced.correlation_id(), Some("c-123"));
            }
            _ => panic!("expected surfaced unhandled error"),
        }
    }

    #[tokio::test]
    async fn test_matched_error_without_disposition_is_handled() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        ctx.on_error(|e| e.to_string().contains("X"), 422, None);

        match run_cascade(anyhow::anyhow!("code X"), &ctx, None, &WrapperOptions::new()).await {
            CascadeOutcome::Surface(surfaced) => {
                assert_eq!(surfaced.kind(), ErrorKind::HandledError);
                assert_eq!(surfaced.http_status(), 422);
            }
            _ => panic!("expected handled error"),
        }
    }

    #[tokio::test]
    async fn test_callback_resolution_swallows_the_error() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        ctx.on_error(
            |e| e.to_string().contains("X"),
            500,
            Some(Disposition::Callback(Arc::new(|_| true))),
        );

        assert!(matches!(
            run_cascade(anyhow::anyhow!("code X"), &ctx, None, &WrapperOptions::new()).await,
            CascadeOutcome::Resolved(Value::Null)
        ));
    }

    #[tokio::test]
    async fn test_forward_disposition_invokes_and_resolves() {
        let invoker = Arc::new(RecordingInvoker::new());
        let ctx = context_with(invoker.clone());
        ctx.on_error(
            |e| e.to_string().contains("X"),
            500,
            Some(Disposition::ForwardTo {
                arn: "arn:aws:lambda:us-east-1:1:function:reporter".to_string(),
            }),
        );

        assert!(matches!(
            run_cascade(anyhow::anyhow!("code X"), &ctx, None, &WrapperOptions::new()).await,
            CascadeOutcome::Resolved(_)
        ));

        let calls = invoker.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["error"], "code X");
        assert_eq!(calls[0].1["correlationId"], "c-123");
    }

    #[tokio::test]
    async fn test_default_error_substitute_carries_original_message() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        ctx.set_default_error(DefaultError::new(503, "placeholder").into());

        match run_cascade(anyhow::anyhow!("actual failure"), &ctx, None, &WrapperOptions::new())
            .await
        {
            CascadeOutcome::Surface(surfaced) => {
                assert_eq!(surfaced.kind(), ErrorKind::DefaultError);
                assert_eq!(surfaced.http_status(), 503);
                assert_eq!(surfaced.message(), "actual failure");
                assert!(surfaced.stack().is_some());
            }
            _ => panic!("expected substitute error"),
        }
    }

    #[tokio::test]
    async fn test_step_policy_has_the_final_say() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        let options = WrapperOptions::new().with_error_handler("cleanup", |_| true);
        let policy = StepErrorHandler::Named { handler: "cleanup".to_string() };

        assert!(matches!(
            run_cascade(anyhow::anyhow!("boom"), &ctx, Some(&policy), &options).await,
            CascadeOutcome::Resolved(_)
        ));
    }

    #[tokio::test]
    async fn test_unregistered_step_handler_leaves_error_surfacing() {
        let ctx = context_with(Arc::new(RecordingInvoker::new()));
        let policy = StepErrorHandler::Named { handler: "ghost".to_string() };

        assert!(matches!(
            run_cascade(anyhow::anyhow!("boom"), &ctx, Some(&policy), &WrapperOptions::new()).await,
            CascadeOutcome::Surface(_)
        ));
    }

    #[tokio::test]
    async fn test_cascade_failure_becomes_error_within_error() {
        let ctx = context_with(Arc::new(FailingInvoker));
        ctx.forward_errors_to("arn:aws:lambda:us-east-1:1:function:reporter");

        match run_cascade(anyhow::anyhow!("boom"), &ctx, None, &WrapperOptions::new()).await {
            CascadeOutcome::Surface(surfaced) => {
                assert_eq!(surfaced.kind(), ErrorKind::ErrorWithinError);
                assert!(surfaced.message().contains("boom"));
                assert_eq!(surfaced.correlation_id(), Some("c-123"));
            }
            _ => panic!("expected error-within-error"),
        }
    }
}
