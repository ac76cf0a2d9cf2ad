//! Error types for envelope encoding and decoding.

use thiserror::Error;

/// Errors that can occur while packing or unpacking envelopes.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Event is not an orchestrated message body")]
    NotOrchestrated,

    #[error("Envelope field '{0}' is missing")]
    MissingField(&'static str),
}
