//! Wire-format body for surfaced errors.

use serde::{Deserialize, Serialize};

use crate::taxonomy::OrchestrateError;

/// JSON body of a gateway error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseBody {
    /// Hierarchical error name, `aws-orchestrate/<code>`.
    pub error_type: String,
    pub error_message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl From<&OrchestrateError> for ErrorResponseBody {
    fn from(err: &OrchestrateError) -> Self {
        Self {
            error_type: err.name(),
            error_message: err.message(),
            code: err.code().to_string(),
            correlation_id: err.correlation_id().map(str::to_string),
            request_id: err.request_id().map(str::to_string),
            stack: err.stack().map(str::to_string),
        }
    }
}
