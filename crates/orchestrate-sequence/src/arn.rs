//! Short-ARN expansion.
//!
//! Conductors refer to functions by short name; the wire always carries
//! the full ARN. Expansion pulls region, account, and stage from the
//! environment the way the platform provisions them.

use std::env;

use crate::error::SequenceError;

/// Environment-derived pieces of a function ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnConfig {
    pub region: String,
    pub account_id: String,
    pub stage: String,
}

impl ArnConfig {
    /// Load from `AWS_REGION` / `AWS_ACCOUNT_ID` / `AWS_STAGE`.
    ///
    /// A missing variable is an error at invoke time, not at build time.
    pub fn from_env() -> Result<Self, SequenceError> {
        Ok(Self {
            region: env::var("AWS_REGION").map_err(|_| SequenceError::MissingEnv("AWS_REGION"))?,
            account_id: env::var("AWS_ACCOUNT_ID")
                .map_err(|_| SequenceError::MissingEnv("AWS_ACCOUNT_ID"))?,
            stage: env::var("AWS_STAGE").map_err(|_| SequenceError::MissingEnv("AWS_STAGE"))?,
        })
    }

    /// Expand a short function name; full ARNs pass through unchanged.
    pub fn expand(&self, name: &str) -> String {
        if name.contains(':') {
            return name.to_string();
        }
        format!(
            "arn:aws:lambda:{}:{}:function:{}-{}",
            self.region, self.account_id, name, self.stage
        )
    }
}

/// Expand a function identifier, reading the environment only when the
/// name actually needs expansion.
pub fn expand_arn(name: &str) -> Result<String, SequenceError> {
    if name.contains(':') {
        return Ok(name.to_string());
    }
    Ok(ArnConfig::from_env()?.expand(name))
}

/// The bare function name of a full or short ARN, without any stage suffix.
pub fn function_name(arn: &str) -> &str {
    let tail = arn.rsplit(':').next().unwrap_or(arn);
    tail.rsplit_once('-')
        .map(|(name, _stage)| name)
        .unwrap_or(tail)
}
