//! Compression codec for envelope fields.
//!
//! Each field of an orchestrated message body (`body`, `sequence`,
//! `headers`) is carried as a string: either plain JSON text, or gzip
//! over the UTF-8 JSON encoding, base64-encoded and prefixed with a
//! marker. Decoding is tolerant of both forms, so producers are free to
//! skip compression for payloads where it would not pay off.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

use crate::error::EnvelopeError;

/// Marker prefix identifying a compressed envelope field.
pub const COMPRESSION_MARKER: &str = "gz:";

/// Payloads whose JSON encoding is shorter than this are sent as plain
/// text; gzip overhead dominates below it.
pub const COMPRESSION_THRESHOLD: usize = 256;

/// Encode a JSON value into an envelope field string.
pub fn compress(value: &Value) -> Result<String, EnvelopeError> {
    let text = serde_json::to_string(value)?;
    if text.len() < COMPRESSION_THRESHOLD {
        return Ok(text);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;

    Ok(format!("{}{}", COMPRESSION_MARKER, BASE64.encode(compressed)))
}

/// Decode an envelope field string back into a JSON value.
///
/// Accepts both the marked compressed form and plain JSON text.
pub fn decompress(text: &str) -> Result<Value, EnvelopeError> {
    match text.strip_prefix(COMPRESSION_MARKER) {
        Some(encoded) => {
            let bytes = BASE64.decode(encoded)?;
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut json = String::new();
            decoder.read_to_string(&mut json)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(serde_json::from_str(text)?),
    }
}
