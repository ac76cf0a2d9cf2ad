//! The sequence tracker protocol.
//!
//! A tracker is a distinguished handler that publishes sequence
//! progress to an external status database. The wrapper notifies it as
//! a side channel; tracker failures never fail the primary handler.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use orchestrate_sequence::{Sequence, StepStatus};

use crate::secrets::{SecretError, SecretStore};

/// Secret path holding the status-database service credentials.
pub const DEFAULT_SECRET_LOCATION: &str = "firebase/SERVICE_ACCOUNT";

/// Root of the tracker document tree in the status database.
pub const TRACKER_ROOT: &str = "aws-orchestrate";

/// Errors raised by the tracker handler.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("AWS_STAGE (or NODE_ENV) must be set for the sequence tracker")]
    MissingStage,

    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("status store error: {0}")]
    Store(String),
}

/// Identity shared by every tracker status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub correlation_id: String,
    /// Total number of steps in the sequence.
    pub total: usize,
    /// Steps settled so far.
    pub current: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_fn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_fn: Option<String>,
}

/// Progress status published for an in-flight sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SequenceStatus {
    Running {
        #[serde(flatten)]
        info: StatusInfo,
    },
    Success {
        #[serde(flatten)]
        info: StatusInfo,
        data: Value,
    },
    Error {
        #[serde(flatten)]
        info: StatusInfo,
        error: Value,
    },
}

impl SequenceStatus {
    pub fn info(&self) -> &StatusInfo {
        match self {
            SequenceStatus::Running { info } => info,
            SequenceStatus::Success { info, .. } => info,
            SequenceStatus::Error { info, .. } => info,
        }
    }

    fn status_info(sequence: &Sequence, correlation_id: &str) -> StatusInfo {
        StatusInfo {
            correlation_id: correlation_id.to_string(),
            total: sequence.steps().len(),
            current: sequence
                .steps()
                .iter()
                .filter(|s| s.status.is_settled())
                .count(),
            current_fn: sequence
                .steps()
                .iter()
                .find(|s| s.status == StepStatus::Active)
                .map(|s| s.arn.clone()),
            origin_fn: sequence.steps().first().map(|s| s.arn.clone()),
        }
    }

    /// Status for a sequence still in flight.
    pub fn running(sequence: &Sequence, correlation_id: &str) -> Self {
        SequenceStatus::Running {
            info: Self::status_info(sequence, correlation_id),
        }
    }

    /// Status for a sequence whose final step produced `data`.
    pub fn success(sequence: &Sequence, correlation_id: &str, data: Value) -> Self {
        SequenceStatus::Success {
            info: Self::status_info(sequence, correlation_id),
            data,
        }
    }

    /// Status for a sequence that failed with `error`.
    pub fn error(sequence: &Sequence, correlation_id: &str, error: Value) -> Self {
        SequenceStatus::Error {
            info: Self::status_info(sequence, correlation_id),
            error,
        }
    }
}

/// Invocation payload for the tracker handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceTrackerRequest {
    pub status: SequenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_secret_location: Option<String>,
}

/// Document store holding tracker state, keyed by slash-separated path.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Write the document at the path, overwriting any previous value.
    async fn write(&self, path: &str, document: &Value) -> Result<(), TrackerError>;
}

/// In-memory status store for tests.
#[derive(Default)]
pub struct MemoryStatusStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, path: &str) -> Option<Value> {
        self.documents.lock().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn write(&self, path: &str, document: &Value) -> Result<(), TrackerError> {
        self.documents
            .lock()
            .await
            .insert(path.to_string(), document.clone());
        Ok(())
    }
}

/// The sample tracker handler.
///
/// Fetches service credentials, writes the status document at
/// `aws-orchestrate/<stage>/<correlationId>` (overwriting any previous
/// progression), and echoes the status.
pub async fn sequence_tracker(
    store: &dyn StatusStore,
    secrets: &dyn SecretStore,
    request: SequenceTrackerRequest,
) -> Result<SequenceStatus, TrackerError> {
    let stage = resolve_stage()?;
    track_at_stage(store, secrets, request, &stage).await
}

/// Stage from `AWS_STAGE`, falling back to `NODE_ENV`.
pub fn resolve_stage() -> Result<String, TrackerError> {
    env::var("AWS_STAGE")
        .or_else(|_| env::var("NODE_ENV"))
        .map_err(|_| TrackerError::MissingStage)
}

async fn track_at_stage(
    store: &dyn StatusStore,
    secrets: &dyn SecretStore,
    request: SequenceTrackerRequest,
    stage: &str,
) -> Result<SequenceStatus, TrackerError> {
    let location = request
        .firebase_secret_location
        .as_deref()
        .unwrap_or(DEFAULT_SECRET_LOCATION);
    let _credentials = secrets.get(location).await?;

    let path = format!(
        "{}/{}/{}",
        TRACKER_ROOT,
        stage,
        request.status.info().correlation_id
    );

    let mut document = serde_json::to_value(&request.status)?;
    if let Some(obj) = document.as_object_mut() {
        obj.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));
    }
    store.write(&path, &document).await?;

    info!(path = %path, "sequence status published");
    Ok(request.status)
}
