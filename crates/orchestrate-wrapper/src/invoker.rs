//! The function-invocation seam.
//!
//! The wrapper never talks to the platform directly; it goes through
//! [`Invoker`]. Production deployments use [`HttpInvoker`] against the
//! Lambda invoke endpoint (or a signing proxy in front of it); tests use
//! [`RecordingInvoker`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors raised by an invocation transport.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("invoke of '{arn}' failed: {message}")]
    Transport { arn: String, message: String },

    #[error("invoke of '{arn}' returned status {status}: {body}")]
    Status {
        arn: String,
        status: u16,
        body: String,
    },
}

/// Dispatches a payload to another function by ARN.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, arn: &str, payload: &Value) -> Result<Value, InvokeError>;
}

/// Invoker backed by the Lambda invoke REST path on a configured
/// endpoint. Request signing is left to the endpoint (a local emulator
/// or a fronting proxy).
pub struct HttpInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpInvoker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Create from the `LAMBDA_INVOKE_ENDPOINT` environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("LAMBDA_INVOKE_ENDPOINT").ok().map(Self::new)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, arn: &str, payload: &Value) -> Result<Value, InvokeError> {
        let url = format!(
            "{}/2015-03-31/functions/{}/invocations",
            self.endpoint.trim_end_matches('/'),
            arn
        );

        debug!(arn = %arn, url = %url, "dispatching invocation");

        let response = self
            .client
            .post(&url)
            .header("X-Amz-Invocation-Type", "Event")
            .json(payload)
            .send()
            .await
            .map_err(|e| InvokeError::Transport {
                arn: arn.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Status {
                arn: arn.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Event-type invokes come back with an empty body.
        let text = response.text().await.map_err(|e| InvokeError::Transport {
            arn: arn.to_string(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// In-memory invoker that records every call and replays canned
/// responses, for tests and local conductors.
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<(String, Value)>>,
    responses: Mutex<HashMap<String, Value>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the response returned for an ARN; unconfigured ARNs
    /// return `null`.
    pub async fn respond_with(&self, arn: impl Into<String>, response: Value) {
        self.responses.lock().await.insert(arn.into(), response);
    }

    /// Every `(arn, payload)` dispatched so far, in order.
    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke(&self, arn: &str, payload: &Value) -> Result<Value, InvokeError> {
        self.calls
            .lock()
            .await
            .push((arn.to_string(), payload.clone()));
        let response = self.responses.lock().await.get(arn).cloned();
        Ok(response.unwrap_or(Value::Null))
    }
}
