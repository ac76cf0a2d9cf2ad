//! Error types for the sequence model.

use orchestrate_envelope::EnvelopeError;
use thiserror::Error;

/// Errors raised while building, progressing, or (de)serializing a sequence.
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sequence already has steps; ingest requires a freshly built sequence")]
    StepsAlreadyIngested,

    #[error("No assigned step remains in the sequence")]
    NoAssignedSteps,

    #[error("Dynamic reference for parameter '{key}' could not be resolved from '{path}'")]
    DynamicResolution { key: String, path: String },

    #[error("Serialized sequence is malformed: {0}")]
    MalformedSequence(String),

    #[error("Environment variable {0} is required to expand a short function name")]
    MissingEnv(&'static str),
}
