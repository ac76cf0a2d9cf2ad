//! Typed error kinds surfaced by the wrapper pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace prefix used in hierarchical error names.
pub const ERROR_NAMESPACE: &str = "aws-orchestrate";

/// HTTP status used when no error code has been configured.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Classification tag carried by every typed error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    HandledError,
    UnhandledError,
    DefaultError,
    RethrowError,
    ErrorWithinError,
    ServerlessError,
    CallDepthExceeded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::HandledError => "handled-error",
            ErrorKind::UnhandledError => "unhandled-error",
            ErrorKind::DefaultError => "default-error",
            ErrorKind::RethrowError => "rethrow-error",
            ErrorKind::ErrorWithinError => "error-within-error",
            ErrorKind::ServerlessError => "serverless-error",
            ErrorKind::CallDepthExceeded => "call-depth-exceeded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "handled-error" => Some(ErrorKind::HandledError),
            "unhandled-error" => Some(ErrorKind::UnhandledError),
            "default-error" => Some(ErrorKind::DefaultError),
            "rethrow-error" => Some(ErrorKind::RethrowError),
            "error-within-error" => Some(ErrorKind::ErrorWithinError),
            "serverless-error" => Some(ErrorKind::ServerlessError),
            "call-depth-exceeded" => Some(ErrorKind::CallDepthExceeded),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-typed error that passes through the cascade unchanged.
///
/// Handlers raise this when they already know the status and
/// classification an error should surface with; the wrapper only
/// enriches it with invocation identity.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ServerlessError {
    pub http_status: u16,
    pub message: String,
    /// Short machine token supplied by the caller (e.g. `auth`).
    pub code: String,
    /// `<functionName>/<code>` once the wrapper has enriched it.
    pub classification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ServerlessError {
    pub fn new(http_status: u16, message: impl Into<String>, classification: impl Into<String>) -> Self {
        let classification = classification.into();
        // The bare code is whatever follows the last prefix separator.
        let code = classification
            .rsplit('/')
            .next()
            .unwrap_or(classification.as_str())
            .to_string();
        Self {
            http_status,
            message: message.into(),
            code,
            classification,
            function_name: None,
            correlation_id: None,
            aws_request_id: None,
            stack: None,
        }
    }

    /// Stamp invocation identity onto the error and rewrite the
    /// classification prefix to the current function name.
    pub fn enrich(
        &mut self,
        function_name: &str,
        correlation_id: &str,
        aws_request_id: &str,
    ) {
        self.function_name = Some(function_name.to_string());
        self.correlation_id = Some(correlation_id.to_string());
        self.aws_request_id = Some(aws_request_id.to_string());
        self.classification = format!("{}/{}", function_name, self.code);
    }
}

/// The matcher recognized the error but no disposition resolved it.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct HandledError {
    pub http_status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl HandledError {
    pub fn new(http_status: u16, source: &anyhow::Error) -> Self {
        Self {
            http_status,
            message: source.to_string(),
            correlation_id: None,
            request_id: None,
            stack: Some(format!("{source:?}")),
        }
    }
}

/// No matcher expectation matched; carries the default error code.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct UnhandledError {
    pub http_status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl UnhandledError {
    pub fn new(http_status: u16, source: &anyhow::Error) -> Self {
        Self {
            http_status,
            message: source.to_string(),
            correlation_id: None,
            request_id: None,
            stack: Some(format!("{source:?}")),
        }
    }
}

/// User-provided substitute surfaced by the `default-error` policy.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct DefaultError {
    pub http_status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl DefaultError {
    pub fn new(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status,
            message: message.into(),
            correlation_id: None,
            request_id: None,
            stack: None,
        }
    }
}

/// Preserves an already-typed error's identity for re-emission, so the
/// cascade never wraps a typed error inside another typed error.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct RethrowError {
    /// Code of the preserved error.
    pub code: String,
    /// Kind tag of the preserved error.
    pub original_kind: ErrorKind,
    pub http_status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RethrowError {
    pub fn from_typed(original: &OrchestrateError) -> Self {
        Self {
            code: original.code().to_string(),
            original_kind: original.kind(),
            http_status: original.http_status(),
            message: original.message().to_string(),
            correlation_id: original.correlation_id().map(str::to_string),
            request_id: original.request_id().map(str::to_string),
            stack: original.stack().map(str::to_string),
        }
    }
}

/// An error handler itself failed; carries the outer failure and the
/// inner cause it was trying to handle.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (while handling: {underlying})")]
pub struct ErrorWithinError {
    pub http_status: u16,
    /// The outer failure raised inside the cascade.
    pub message: String,
    /// Description of the error that was being handled.
    pub underlying: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorWithinError {
    pub fn new(outer: &anyhow::Error, underlying: &anyhow::Error) -> Self {
        Self {
            http_status: DEFAULT_ERROR_STATUS,
            message: outer.to_string(),
            underlying: underlying.to_string(),
            correlation_id: None,
            request_id: None,
            stack: Some(format!("{outer:?}")),
        }
    }
}

/// A function exceeded its configured self-invocation limit.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("call depth {depth} exceeds the configured limit of {limit}")]
pub struct CallDepthExceeded {
    pub http_status: u16,
    pub depth: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CallDepthExceeded {
    pub fn new(depth: u32, limit: u32) -> Self {
        Self {
            http_status: DEFAULT_ERROR_STATUS,
            depth,
            limit,
            correlation_id: None,
            request_id: None,
        }
    }
}

/// Any typed error the wrapper can surface.
#[derive(Debug, Clone, Error)]
pub enum OrchestrateError {
    #[error(transparent)]
    Handled(HandledError),
    #[error(transparent)]
    Unhandled(UnhandledError),
    #[error(transparent)]
    Default(DefaultError),
    #[error(transparent)]
    Rethrow(RethrowError),
    #[error(transparent)]
    WithinError(ErrorWithinError),
    #[error(transparent)]
    Serverless(ServerlessError),
    #[error(transparent)]
    CallDepth(CallDepthExceeded),
}

impl OrchestrateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrateError::Handled(_) => ErrorKind::HandledError,
            OrchestrateError::Unhandled(_) => ErrorKind::UnhandledError,
            OrchestrateError::Default(_) => ErrorKind::DefaultError,
            OrchestrateError::Rethrow(_) => ErrorKind::RethrowError,
            OrchestrateError::WithinError(_) => ErrorKind::ErrorWithinError,
            OrchestrateError::Serverless(_) => ErrorKind::ServerlessError,
            OrchestrateError::CallDepth(_) => ErrorKind::CallDepthExceeded,
        }
    }

    /// Short machine token: the caller classification for serverless
    /// errors, the preserved code for rethrows, the kind tag otherwise.
    pub fn code(&self) -> &str {
        match self {
            OrchestrateError::Serverless(e) => &e.code,
            OrchestrateError::Rethrow(e) => &e.code,
            _ => self.kind().as_str(),
        }
    }

    /// Hierarchical error name, `aws-orchestrate/<code>`.
    pub fn name(&self) -> String {
        format!("{}/{}", ERROR_NAMESPACE, self.code())
    }

    pub fn http_status(&self) -> u16 {
        match self {
            OrchestrateError::Handled(e) => e.http_status,
            OrchestrateError::Unhandled(e) => e.http_status,
            OrchestrateError::Default(e) => e.http_status,
            OrchestrateError::Rethrow(e) => e.http_status,
            OrchestrateError::WithinError(e) => e.http_status,
            OrchestrateError::Serverless(e) => e.http_status,
            OrchestrateError::CallDepth(e) => e.http_status,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            OrchestrateError::Handled(e) => e.correlation_id.as_deref(),
            OrchestrateError::Unhandled(e) => e.correlation_id.as_deref(),
            OrchestrateError::Default(e) => e.correlation_id.as_deref(),
            OrchestrateError::Rethrow(e) => e.correlation_id.as_deref(),
            OrchestrateError::WithinError(e) => e.correlation_id.as_deref(),
            OrchestrateError::Serverless(e) => e.correlation_id.as_deref(),
            OrchestrateError::CallDepth(e) => e.correlation_id.as_deref(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            OrchestrateError::Handled(e) => e.request_id.as_deref(),
            OrchestrateError::Unhandled(e) => e.request_id.as_deref(),
            OrchestrateError::Default(e) => e.request_id.as_deref(),
            OrchestrateError::Rethrow(e) => e.request_id.as_deref(),
            OrchestrateError::WithinError(e) => e.request_id.as_deref(),
            OrchestrateError::Serverless(e) => e.aws_request_id.as_deref(),
            OrchestrateError::CallDepth(e) => e.request_id.as_deref(),
        }
    }

    pub fn stack(&self) -> Option<&str> {
        match self {
            OrchestrateError::Handled(e) => e.stack.as_deref(),
            OrchestrateError::Unhandled(e) => e.stack.as_deref(),
            OrchestrateError::Default(e) => e.stack.as_deref(),
            OrchestrateError::Rethrow(e) => e.stack.as_deref(),
            OrchestrateError::WithinError(e) => e.stack.as_deref(),
            OrchestrateError::Serverless(e) => e.stack.as_deref(),
            OrchestrateError::CallDepth(_) => None,
        }
    }

    /// Stamp correlation identity onto the error; existing values win.
    pub fn set_identity(&mut self, correlation_id: &str, request_id: &str) {
        macro_rules! fill {
            ($e:expr, $rid:ident) => {{
                if $e.correlation_id.is_none() {
                    $e.correlation_id = Some(correlation_id.to_string());
                }
                if $e.$rid.is_none() {
                    $e.$rid = Some(request_id.to_string());
                }
            }};
        }
        match self {
            OrchestrateError::Handled(e) => fill!(e, request_id),
            OrchestrateError::Unhandled(e) => fill!(e, request_id),
            OrchestrateError::Default(e) => fill!(e, request_id),
            OrchestrateError::Rethrow(e) => fill!(e, request_id),
            OrchestrateError::WithinError(e) => fill!(e, request_id),
            OrchestrateError::Serverless(e) => fill!(e, aws_request_id),
            OrchestrateError::CallDepth(e) => fill!(e, request_id),
        }
    }
}

impl From<HandledError> for OrchestrateError {
    fn from(e: HandledError) -> Self {
        OrchestrateError::Handled(e)
    }
}

impl From<UnhandledError> for OrchestrateError {
    fn from(e: UnhandledError) -> Self {
        OrchestrateError::Unhandled(e)
    }
}

impl From<DefaultError> for OrchestrateError {
    fn from(e: DefaultError) -> Self {
        OrchestrateError::Default(e)
    }
}

impl From<RethrowError> for OrchestrateError {
    fn from(e: RethrowError) -> Self {
        OrchestrateError::Rethrow(e)
    }
}

impl From<ErrorWithinError> for OrchestrateError {
    fn from(e: ErrorWithinError) -> Self {
        OrchestrateError::WithinError(e)
    }
}

impl From<ServerlessError> for OrchestrateError {
    fn from(e: ServerlessError) -> Self {
        OrchestrateError::Serverless(e)
    }
}

impl From<CallDepthExceeded> for OrchestrateError {
    fn from(e: CallDepthExceeded) -> Self {
        OrchestrateError::CallDepth(e)
    }
}

/// Downcast an open-world handler error to the typed taxonomy.
pub fn as_typed(err: &anyhow::Error) -> Option<&OrchestrateError> {
    err.downcast_ref::<OrchestrateError>()
}

/// Downcast an open-world handler error to a bare [`ServerlessError`].
pub fn as_serverless(err: &anyhow::Error) -> Option<&ServerlessError> {
    err.downcast_ref::<ServerlessError>().or_else(|| {
        match err.downcast_ref::<OrchestrateError>() {
            Some(OrchestrateError::Serverless(e)) => Some(e),
            _ => None,
        }
    })
}
