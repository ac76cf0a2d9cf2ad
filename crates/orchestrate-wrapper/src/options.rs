//! Wrapper configuration.

use std::collections::HashMap;
use std::sync::Arc;

/// A named error handler registered with the wrapper.
///
/// Steps refer to these by name in their `onError` policy; returning
/// `true` means the error was fully resolved.
pub type NamedErrorHandler = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Per-function options for the wrapper pipeline.
#[derive(Clone, Default)]
pub struct WrapperOptions {
    /// ARN of the tracker to notify while a sequence is in flight.
    pub sequence_tracker: Option<String>,

    /// Maximum self-invocation count before the wrapper refuses to
    /// continue the chain.
    pub call_depth_limit: Option<u32>,

    handlers: HashMap<String, NamedErrorHandler>,
}

impl WrapperOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence_tracker(mut self, arn: impl Into<String>) -> Self {
        self.sequence_tracker = Some(arn.into());
        self
    }

    pub fn with_call_depth_limit(mut self, limit: u32) -> Self {
        self.call_depth_limit = Some(limit);
        self
    }

    /// Register a named error handler resolvable from a step's
    /// `onError` policy.
    pub fn with_error_handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn error_handler(&self, name: &str) -> Option<&NamedErrorHandler> {
        self.handlers.get(name)
    }
}
