//! User-registered error expectations and the default policy applied
//! when none of them match.

use std::sync::Arc;

use crate::taxonomy::{OrchestrateError, DEFAULT_ERROR_STATUS};

/// Predicate deciding whether an expectation matches a thrown error.
pub type ErrorPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Callback run against a matched error; returning `true` means the
/// error is fully resolved.
pub type ErrorCallback = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// What to do with an error once an expectation matches it.
#[derive(Clone)]
pub enum Disposition {
    /// Run the callback locally; truthy return resolves the error.
    Callback(ErrorCallback),
    /// Invoke the named function with the error payload and treat the
    /// error as resolved.
    ForwardTo { arn: String },
}

/// A single registered expectation.
#[derive(Clone)]
pub struct Expectation {
    pub predicate: ErrorPredicate,
    pub http_status: u16,
    pub disposition: Option<Disposition>,
}

/// Policy applied when no expectation matches.
#[derive(Clone)]
pub enum DefaultPolicy {
    /// Surface as an unhandled error with this status code.
    Default { http_status: u16 },
    /// Run a user function; truthy return resolves, otherwise surface
    /// as unhandled with this status code.
    HandlerFn {
        handler: ErrorCallback,
        http_status: u16,
    },
    /// Invoke the configured function with the error payload, then
    /// swallow the error locally.
    Forwarding { arn: String },
    /// Surface the user-provided substitute error.
    DefaultError { error: OrchestrateError },
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        DefaultPolicy::Default {
            http_status: DEFAULT_ERROR_STATUS,
        }
    }
}

/// Ordered collection of expectations plus the default policy.
///
/// Lookup is first-match in registration order.
#[derive(Clone, Default)]
pub struct ErrorMatcher {
    expectations: Vec<Expectation>,
    default_policy: DefaultPolicy,
}

impl ErrorMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expectation. `disposition` of `None` means "wrap as a
    /// handled error with this status code and re-surface".
    pub fn add<P>(&mut self, predicate: P, http_status: u16, disposition: Option<Disposition>)
    where
        P: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.expectations.push(Expectation {
            predicate: Arc::new(predicate),
            http_status,
            disposition,
        });
    }

    /// First expectation whose predicate accepts the error.
    pub fn find(&self, err: &anyhow::Error) -> Option<&Expectation> {
        self.expectations.iter().find(|e| (e.predicate)(err))
    }

    pub fn default_policy(&self) -> &DefaultPolicy {
        &self.default_policy
    }

    /// Replace the default policy with a plain status code.
    pub fn set_default_code(&mut self, http_status: u16) {
        self.default_policy = DefaultPolicy::Default { http_status };
    }

    /// Replace the default policy with a local handler function.
    pub fn set_default_handler<F>(&mut self, handler: F, http_status: u16)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.default_policy = DefaultPolicy::HandlerFn {
            handler: Arc::new(handler),
            http_status,
        };
    }

    /// Replace the default policy with error forwarding.
    pub fn set_default_forwarding(&mut self, arn: impl Into<String>) {
        self.default_policy = DefaultPolicy::Forwarding { arn: arn.into() };
    }

    /// Replace the default policy with a substitute error.
    pub fn set_default_error(&mut self, error: OrchestrateError) {
        self.default_policy = DefaultPolicy::DefaultError { error };
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::ServerlessError;

    fn has_code(err: &anyhow::Error, code: &str) -> bool {
        err.to_string().contains(code)
    }

    #[test]
    fn test_first_match_wins() {
        let mut matcher = ErrorMatcher::new();
        matcher.add(|e| has_code(e, "X"), 400, None);
        matcher.add(|e| has_code(e, "X"), 500, None);

        let err = anyhow::anyhow!("code X");
        let matched = matcher.find(&err).unwrap();
        assert_eq!(matched.http_status, 400);
    }

    #[test]
    fn test_no_match_returns_none() {
        let mut matcher = ErrorMatcher::new();
        matcher.add(|e| has_code(e, "X"), 400, None);

        assert!(matcher.find(&anyhow::anyhow!("code Y")).is_none());
    }

    #[test]
    fn test_default_policy_starts_as_plain_500() {
        let matcher = ErrorMatcher::new();
        match matcher.default_policy() {
            DefaultPolicy::Default { http_status } => assert_eq!(*http_status, 500),
            _ => panic!("expected plain default policy"),
        }
    }

    #[test]
    fn test_default_policy_replacement() {
        let mut matcher = ErrorMatcher::new();

        matcher.set_default_forwarding("reporter");
        assert!(matches!(
            matcher.default_policy(),
            DefaultPolicy::Forwarding { arn } if arn == "reporter"
        ));

        matcher.set_default_error(ServerlessError::new(418, "teapot", "brew").into());
        assert!(matches!(
            matcher.default_policy(),
            DefaultPolicy::DefaultError { .. }
        ));

        matcher.set_default_handler(|_| true, 204);
        assert!(matches!(
            matcher.default_policy(),
            DefaultPolicy::HandlerFn { http_status: 204, .. }
        ));
    }

    #[test]
    fn test_forward_disposition_is_preserved() {
        let mut matcher = ErrorMatcher::new();
        matcher.add(
            |e| has_code(e, "X"),
            500,
            Some(Disposition::ForwardTo {
                arn: "reporter".to_string(),
            }),
        );

        let err = anyhow::anyhow!("code X");
        match &matcher.find(&err).unwrap().disposition {
            Some(Disposition::ForwardTo { arn }) => assert_eq!(arn, "reporter"),
            _ => panic!("expected forward disposition"),
        }
    }
}
