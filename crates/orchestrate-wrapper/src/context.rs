//! Per-invocation handler context.
//!
//! Everything a handler can reach lives here, rebuilt on every
//! invocation so nothing bleeds across container reuse. Registration
//! slots (new sequence, response shape, error matcher, log mask) are
//! shared cells owned by the invocation, not module state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use orchestrate_errors::{Disposition, ErrorMatcher, OrchestrateError};
use orchestrate_sequence::{expand_arn, Sequence};

use crate::invoker::Invoker;
use crate::secrets::{SecretError, SecretStore};
use crate::tracker::StatusStore;

/// Platform-supplied fields for the current invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationInfo {
    pub function_name: String,
    pub aws_request_id: String,
    pub invoked_function_arn: Option<String>,
    pub remaining_time_ms: Option<u64>,
}

impl InvocationInfo {
    pub fn new(function_name: impl Into<String>, aws_request_id: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            aws_request_id: aws_request_id.into(),
            invoked_function_arn: None,
            remaining_time_ms: None,
        }
    }
}

/// Response-shaping knobs a handler may set for gateway marshalling.
#[derive(Debug, Clone, Default)]
pub struct ResponseShape {
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Immutable per-invocation record supplied to the user function.
#[derive(Clone)]
pub struct HandlerContext {
    pub correlation_id: String,
    pub invocation: InvocationInfo,
    /// Snapshot of the sequence this invocation participates in.
    pub sequence: Sequence,
    /// Originating gateway metadata, when the event came through the
    /// gateway.
    pub gateway: Option<Value>,
    pub headers: HashMap<String, String>,
    pub query_parameters: HashMap<String, String>,
    /// Decoded JWT custom claims; empty when the request carried none.
    pub claims: Map<String, Value>,

    invoker: Arc<dyn Invoker>,
    secrets: Arc<dyn SecretStore>,
    status_store: Arc<dyn StatusStore>,
    registered_sequence: Arc<Mutex<Option<Sequence>>>,
    response_shape: Arc<Mutex<ResponseShape>>,
    matcher: Arc<Mutex<ErrorMatcher>>,
    log_mask: Arc<Mutex<HashSet<String>>>,
}

impl HandlerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlation_id: String,
        invocation: InvocationInfo,
        sequence: Sequence,
        gateway: Option<Value>,
        headers: HashMap<String, String>,
        query_parameters: HashMap<String, String>,
        claims: Map<String, Value>,
        invoker: Arc<dyn Invoker>,
        secrets: Arc<dyn SecretStore>,
        status_store: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            correlation_id,
            invocation,
            sequence,
            gateway,
            headers,
            query_parameters,
            claims,
            invoker,
            secrets,
            status_store,
            registered_sequence: Arc::new(Mutex::new(None)),
            response_shape: Arc::new(Mutex::new(ResponseShape::default())),
            matcher: Arc::new(Mutex::new(ErrorMatcher::new())),
            log_mask: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Fetch a secret. Every string leaf of the value is added to the
    /// invocation's log mask.
    pub async fn secret(&self, path: &str) -> Result<Value, SecretError> {
        let value = self.secrets.get(path).await?;
        self.register_mask(&value);
        Ok(value)
    }

    /// Invoke another function, expanding short names first.
    pub async fn invoke(&self, target: &str, payload: &Value) -> anyhow::Result<Value> {
        let arn = expand_arn(target)?;
        Ok(self.invoker.invoke(&arn, payload).await?)
    }

    /// Register a new sequence to start once this handler returns.
    pub fn register_sequence(&self, sequence: Sequence) {
        debug!(steps = sequence.steps().len(), "new sequence registered");
        *self.registered_sequence.lock() = Some(sequence);
    }

    /// Set the status code for a successful gateway response.
    pub fn set_status_code(&self, code: u16) {
        self.response_shape.lock().status_code = Some(code);
    }

    /// Set the `Content-Type` of the gateway response.
    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.response_shape.lock().content_type = Some(content_type.into());
    }

    /// Append a header to the gateway response.
    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.response_shape
            .lock()
            .headers
            .insert(name.into(), value.into());
    }

    /// Register an error expectation; see
    /// [`ErrorMatcher::add`](orchestrate_errors::ErrorMatcher::add).
    pub fn on_error<P>(&self, predicate: P, http_status: u16, disposition: Option<Disposition>)
    where
        P: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.matcher.lock().add(predicate, http_status, disposition);
    }

    /// Default policy: surface unmatched errors with this status code.
    pub fn set_default_error_code(&self, http_status: u16) {
        self.matcher.lock().set_default_code(http_status);
    }

    /// Default policy: run a handler function for unmatched errors.
    pub fn set_default_error_handler<F>(&self, handler: F, http_status: u16)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.matcher.lock().set_default_handler(handler, http_status);
    }

    /// Default policy: forward unmatched errors to the named function.
    pub fn forward_errors_to(&self, arn: impl Into<String>) {
        self.matcher.lock().set_default_forwarding(arn);
    }

    /// Default policy: surface this substitute error for unmatched errors.
    pub fn set_default_error(&self, error: OrchestrateError) {
        self.matcher.lock().set_default_error(error);
    }

    /// Redact every masked secret value from a piece of log output.
    pub fn masked(&self, text: &str) -> String {
        let mask = self.log_mask.lock();
        let mut out = text.to_string();
        for value in mask.iter() {
            if !value.is_empty() {
                out = out.replace(value.as_str(), "*****");
            }
        }
        out
    }

    /// Handle to the status database used by the tracker.
    pub fn status_store(&self) -> Arc<dyn StatusStore> {
        Arc::clone(&self.status_store)
    }

    pub(crate) fn invoker(&self) -> Arc<dyn Invoker> {
        Arc::clone(&self.invoker)
    }

    pub(crate) fn take_registered_sequence(&self) -> Option<Sequence> {
        self.registered_sequence.lock().take()
    }

    pub(crate) fn response_shape(&self) -> ResponseShape {
        self.response_shape.lock().clone()
    }

    pub(crate) fn matcher_snapshot(&self) -> ErrorMatcher {
        self.matcher.lock().clone()
    }

    fn register_mask(&self, value: &Value) {
        let mut mask = self.log_mask.lock();
        collect_strings(value, &mut mask);
    }
}

fn collect_strings(value: &Value, into: &mut HashSet<String>) {
    match value {
        Value::String(s) => {
            into.insert(s.clone());
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, into);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_strings(item, into);
            }
        }
        _ => {}
    }
}
